//! Program dispatch channel
//!
//! Second TCP connection to the controller, carrying UTF-8 program text.
//! The controller sends no reply on this socket: acceptance is observed as
//! the state model's run state entering Running, completion as the return
//! to Idle. Dispatch therefore requires a live telemetry session feeding
//! the state model.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::SessionState;
use crate::state::StateHandle;
use crate::types::RuntimeState;

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const DRAIN_CHUNK: usize = 4096;

/// Client for the program dispatch port.
///
/// One program at a time: dispatch waits for any running program to leave
/// the interpreter before sending the next.
pub struct RealtimeClient {
    stream: TcpStream,
    state: Arc<StateHandle>,
    session: Arc<SessionState>,
    program_timeout: Duration,
    drain: Option<JoinHandle<()>>,
}

impl RealtimeClient {
    /// Connect to the controller's program dispatch port.
    ///
    /// `state` and `session` come from the telemetry client whose merge
    /// stage observes the run-state transitions.
    pub fn connect(
        config: &Config,
        state: Arc<StateHandle>,
        session: Arc<SessionState>,
    ) -> Result<Self> {
        let address = config.robot.realtime_addr()?;
        log::info!("Connecting to program dispatch interface at {}", address);

        let stream = TcpStream::connect_timeout(&address, config.timing.connect_timeout())?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let drain = thread::Builder::new().name("realtime-drain".into()).spawn({
            let stream = stream.try_clone()?;
            let session = Arc::clone(&session);
            move || drain_loop(stream, session)
        })?;

        Ok(Self {
            stream,
            state,
            session,
            program_timeout: config.timing.program_timeout(),
            drain: Some(drain),
        })
    }

    /// Dispatch program text with the configured timeout.
    pub fn send_program(&mut self, program: &str) -> Result<()> {
        self.send_program_with_timeout(program, self.program_timeout)
    }

    /// Dispatch program text and block until the interpreter starts it.
    ///
    /// Waits for any currently running program first, then sends, then
    /// waits for the run state to enter Running. `timeout` bounds each of
    /// the two waits; expiry fails with `Timeout` and the state model keeps
    /// whatever the controller last reported.
    pub fn send_program_with_timeout(&mut self, program: &str, timeout: Duration) -> Result<()> {
        if program.trim().is_empty() {
            return Err(Error::InvalidParameter("program text is empty".into()));
        }

        self.state.wait_for(&self.session, timeout, |s| {
            s.runtime_state != RuntimeState::Running
        })?;

        let mut bytes = Vec::with_capacity(program.len() + 2);
        bytes.extend_from_slice(program.as_bytes());
        // Trailing line continuation marker, two literal characters
        bytes.push(b'\\');
        bytes.push(b'n');

        log::debug!("Dispatching {} byte program", bytes.len());
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;

        self.state.wait_for(&self.session, timeout, |s| {
            s.runtime_state == RuntimeState::Running
        })?;
        log::debug!("Program accepted, run state is Running");
        Ok(())
    }

    /// Block until the run state returns to Idle.
    pub fn wait_program_complete(&self, timeout: Duration) -> Result<()> {
        self.state.wait_for(&self.session, timeout, |s| {
            s.runtime_state == RuntimeState::Idle
        })
    }

    /// Close the socket and join the drain thread. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(worker) = self.drain.take() {
            if worker.join().is_err() {
                log::error!("Realtime drain thread panicked during shutdown");
            }
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The controller publishes its own state packets on this socket. Nothing
/// here consumes them, but reading keeps the TCP window open.
fn drain_loop(mut stream: TcpStream, session: Arc<SessionState>) {
    log::info!("Realtime drain thread started");
    let mut scratch = [0u8; DRAIN_CHUNK];
    loop {
        if session.is_shutdown() {
            break;
        }
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                log::debug!("Realtime socket read ended: {}", e);
                break;
            }
        }
    }
    log::info!("Realtime drain thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldValue;
    use crate::state::{FieldId, StateUpdate};
    use std::net::TcpListener;

    fn test_config(port: u16) -> Config {
        let mut config = Config::ur_defaults();
        config.robot.host = "127.0.0.1".to_string();
        config.robot.realtime_port = port;
        config
    }

    fn set_runtime(state: &StateHandle, runtime: RuntimeState) {
        state
            .apply_update(&StateUpdate {
                values: vec![(FieldId::RuntimeState, FieldValue::UInt32(runtime as u32))],
            })
            .unwrap();
    }

    fn connect_pair() -> (RealtimeClient, TcpStream, Arc<StateHandle>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(StateHandle::new());
        let session = Arc::new(SessionState::new());
        let client = RealtimeClient::connect(
            &test_config(port),
            Arc::clone(&state),
            Arc::clone(&session),
        )
        .unwrap();
        let (peer, _) = listener.accept().unwrap();
        (client, peer, state)
    }

    #[test]
    fn test_send_program_appends_marker_and_waits_for_running() {
        let (mut client, mut peer, state) = connect_pair();
        set_runtime(&state, RuntimeState::Idle);

        let flipper = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                set_runtime(&state, RuntimeState::Running);
            })
        };

        client
            .send_program_with_timeout("movej([0,0,0,0,0,0])", Duration::from_secs(2))
            .unwrap();
        flipper.join().unwrap();

        let mut received = vec![0u8; 64];
        let n = peer.read(&mut received).unwrap();
        assert_eq!(&received[..n], b"movej([0,0,0,0,0,0])\\n");
    }

    #[test]
    fn test_send_program_times_out_while_idle() {
        let (mut client, _peer, state) = connect_pair();
        set_runtime(&state, RuntimeState::Idle);

        let result = client.send_program_with_timeout("movej([0,0,0,0,0,0])", Duration::from_millis(80));
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[test]
    fn test_send_program_waits_for_previous_program() {
        let (mut client, _peer, state) = connect_pair();
        set_runtime(&state, RuntimeState::Running);

        let flipper = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                set_runtime(&state, RuntimeState::Idle);
                thread::sleep(Duration::from_millis(40));
                set_runtime(&state, RuntimeState::Running);
            })
        };

        client
            .send_program_with_timeout("movej([0,0,0,0,0,0])", Duration::from_secs(2))
            .unwrap();
        flipper.join().unwrap();
    }

    #[test]
    fn test_wait_program_complete() {
        let (client, _peer, state) = connect_pair();
        set_runtime(&state, RuntimeState::Running);

        assert!(matches!(
            client.wait_program_complete(Duration::from_millis(80)),
            Err(Error::Timeout)
        ));

        let flipper = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                set_runtime(&state, RuntimeState::Idle);
            })
        };
        client.wait_program_complete(Duration::from_secs(2)).unwrap();
        flipper.join().unwrap();
    }

    #[test]
    fn test_empty_program_rejected() {
        let (mut client, _peer, _state) = connect_pair();
        let result = client.send_program("   ");
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
