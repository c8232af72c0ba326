//! Administrative client
//!
//! Line-oriented text channel for controller administration: power and
//! brake control, protective-stop release, popup dismissal. Every command
//! is one ASCII line; the server answers with one line, returned verbatim.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::config::Config;
use crate::error::{Error, Result};

/// Blocking client for the administrative port.
pub struct DashboardClient {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

impl DashboardClient {
    /// Connect and consume the server's banner line.
    pub fn connect(config: &Config) -> Result<Self> {
        let address = config.robot.dashboard_addr()?;
        log::info!("Connecting to administrative interface at {}", address);

        let stream = TcpStream::connect_timeout(&address, config.timing.connect_timeout())?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(config.timing.reply_timeout()))?;

        let mut client = Self {
            reader: BufReader::new(stream.try_clone()?),
            stream,
        };
        let banner = client.read_line()?;
        log::info!("Administrative server: {}", banner);
        Ok(client)
    }

    /// Send one command line and return the server's one-line response.
    pub fn command(&mut self, command: &str) -> Result<String> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;

        let response = self.read_line()?;
        log::debug!("Administrative command '{}' -> '{}'", command, response);
        Ok(response)
    }

    pub fn power_on(&mut self) -> Result<String> {
        self.command("power on")
    }

    pub fn power_off(&mut self) -> Result<String> {
        self.command("power off")
    }

    pub fn stop(&mut self) -> Result<String> {
        self.command("stop")
    }

    pub fn shutdown(&mut self) -> Result<String> {
        self.command("shutdown")
    }

    pub fn unlock_protective_stop(&mut self) -> Result<String> {
        self.command("unlock protective stop")
    }

    pub fn close_safety_popup(&mut self) -> Result<String> {
        self.command("close safety popup")
    }

    pub fn brake_release(&mut self) -> Result<String> {
        self.command("brake release")
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Err(Error::Disconnected),
            Ok(_) => Ok(line.trim_end().to_string()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(Error::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn test_config(port: u16) -> Config {
        let mut config = Config::ur_defaults();
        config.robot.host = "127.0.0.1".to_string();
        config.robot.dashboard_port = port;
        config.timing.reply_timeout_ms = 500;
        config
    }

    fn scripted_server(responses: Vec<&'static str>) -> (u16, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut stream = stream;
            stream
                .write_all(b"Connected: Universal Robots Dashboard Server\n")
                .unwrap();

            let mut received = Vec::new();
            for response in responses {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                received.push(line.trim_end().to_string());
                stream.write_all(response.as_bytes()).unwrap();
                stream.write_all(b"\n").unwrap();
            }
            received
        });
        (port, handle)
    }

    #[test]
    fn test_command_round_trip() {
        let (port, server) = scripted_server(vec!["Powering on", "Brake releasing"]);
        let mut client = DashboardClient::connect(&test_config(port)).unwrap();

        assert_eq!(client.power_on().unwrap(), "Powering on");
        assert_eq!(client.brake_release().unwrap(), "Brake releasing");
        drop(client);

        let received = server.join().unwrap();
        assert_eq!(received, vec!["power on", "brake release"]);
    }

    #[test]
    fn test_server_close_is_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Connected\n").unwrap();
            stream.shutdown(std::net::Shutdown::Write).unwrap();
            // Keep the read half open until the command arrives
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            line
        });

        let mut client = DashboardClient::connect(&test_config(port)).unwrap();
        assert!(matches!(client.command("stop"), Err(Error::Disconnected)));
        assert_eq!(server.join().unwrap().trim_end(), "stop");
    }

    #[test]
    fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Connected\n").unwrap();
            // Swallow the command, never reply, wait for the client to close
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let _ = reader.read_line(&mut line);
            let _ = reader.read_line(&mut line);
        });

        let mut client = DashboardClient::connect(&test_config(port)).unwrap();
        assert!(matches!(client.command("stop"), Err(Error::Timeout)));
        drop(client);
        server.join().unwrap();
    }
}
