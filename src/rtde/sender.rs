//! Paced send channel
//!
//! A single writer thread drains the outbound frame queue oldest-first.
//! During setup the controller must not receive commands back to back, so a
//! fixed spacing sleep follows every write while the session is not yet
//! streaming. Once streaming starts, queued data packages go out at whatever
//! rate the caller produces them.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::session::SessionState;
use crate::types::ConnectionState;

use super::QUEUE_POLL;

pub(crate) fn sender_loop(
    mut stream: TcpStream,
    frames: Receiver<Vec<u8>>,
    session: Arc<SessionState>,
    spacing: Duration,
) {
    log::info!(
        "Sender thread started ({} ms setup spacing)",
        spacing.as_millis()
    );

    loop {
        if session.is_shutdown() {
            break;
        }

        let frame = match frames.recv_timeout(QUEUE_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if let Err(e) = stream.write_all(&frame).and_then(|_| stream.flush()) {
            if !session.is_shutdown() {
                session.fail(Error::Io(e));
            }
            break;
        }
        log::trace!("Sent {} byte frame", frame.len());

        if session.connection() != ConnectionState::Started {
            thread::sleep(spacing);
        }
    }

    log::info!("Sender thread stopped");
}
