//! Test utilities for libmu integration tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libmu::{Connection, ConnectionBuilder, ConnectionObserver, ConnectionState, Error};

/// Default read timeout used against the fake server.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

/// Path to the shell script that impersonates `mu server`.
pub fn fake_server_script() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("fake_mu_server.sh")
}

/// Builder pointed at the fake server, run through `sh`.
pub fn fake_server() -> ConnectionBuilder {
    Connection::builder()
        .binary("sh")
        .subcommand(fake_server_script().display().to_string())
        .timeout(TEST_TIMEOUT)
        .verbose(true)
}

/// Connect to the fake server with a recording observer attached.
pub async fn connect_recorded() -> (Connection, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let conn = fake_server()
        .observer(observer.clone())
        .connect()
        .await
        .expect("fake server should start");
    (conn, observer)
}

/// Observer that remembers every event it sees.
#[derive(Default)]
pub struct RecordingObserver {
    pub spawns: Mutex<Vec<u32>>,
    pub states: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    pub restarts: Mutex<Vec<(u32, u32)>>,
    pub discards: Mutex<Vec<(usize, String)>>,
    pub malformed: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Every state the connection entered, in order.
    pub fn entered_states(&self) -> Vec<ConnectionState> {
        self.states.lock().unwrap().iter().map(|(_, to)| *to).collect()
    }

    /// Restarts seen so far.
    pub fn restarts(&self) -> Vec<(u32, u32)> {
        self.restarts.lock().unwrap().clone()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_spawn(&self, pid: u32) {
        self.spawns.lock().unwrap().push(pid);
    }

    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        self.states.lock().unwrap().push((from, to));
    }

    fn on_restart(&self, old_pid: u32, new_pid: u32) {
        self.restarts.lock().unwrap().push((old_pid, new_pid));
    }

    fn on_discard(&self, bytes: usize, reason: &str) {
        self.discards.lock().unwrap().push((bytes, reason.to_string()));
    }

    fn on_malformed_frame(&self, _payload: &[u8], error: &Error) {
        self.malformed.lock().unwrap().push(error.to_string());
    }
}
