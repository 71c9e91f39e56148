//! Accept loop for consumer connections.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::SERVER_TARGET;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Accepts connections until `shutdown` is raised, handing each accepted
/// stream to `handle` on its own thread.
///
/// The listener must already be in non-blocking mode.
pub(crate) fn run_accept_loop<H>(listener: &TcpListener, shutdown: &AtomicBool, handle: H)
where
    H: Fn(TcpStream) + Clone + Send + 'static,
{
    match listener.local_addr() {
        Ok(addr) => info!(target: SERVER_TARGET, %addr, "federation listener active"),
        Err(error) => info!(target: SERVER_TARGET, error = %error, "federation listener active"),
    }
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let handle = handle.clone();
                let spawned = thread::Builder::new()
                    .name("federationd-consumer".to_owned())
                    .spawn(move || handle(stream));
                if let Err(error) = spawned {
                    warn!(target: SERVER_TARGET, error = %error, "failed to spawn consumer thread");
                }
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "consumer accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    debug!(target: SERVER_TARGET, "federation listener stopped");
}

fn accept_connection(listener: &TcpListener) -> io::Result<Option<TcpStream>> {
    match listener.accept() {
        Ok((stream, peer)) => {
            stream.set_nonblocking(false)?;
            debug!(target: SERVER_TARGET, %peer, "consumer connected");
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}
