//! The pool creation event carries the connection fields and never the password

mod common;

use common::{config, FakeBackend};
use poolward_core::ConnectionManager;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[tokio::test]
async fn creation_event_has_fields_but_no_secret() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let manager = ConnectionManager::with_backend(FakeBackend::new(), config("db-a", 5));
    drop(manager.acquire().await.unwrap());

    let logs = captured.text();
    let line = logs
        .lines()
        .find(|line| line.contains("creating postgres connection pool"))
        .expect("creation event");
    assert!(line.contains("max_size=5"));
    assert!(line.contains("user=restorator"));
    assert!(line.contains("host=db-a"));
    assert!(line.contains("port=5432"));
    assert!(line.contains("database=population"));

    assert!(logs.contains("connection pool ready"));
    assert!(logs.contains("lease returned"));
    assert!(!logs.contains("s3cret"));
}

#[tokio::test]
async fn failed_probe_is_logged_as_warning() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let manager =
        ConnectionManager::with_backend(FakeBackend::new().unreachable(), config("db-a", 5));
    assert!(manager.acquire().await.is_err());

    let logs = captured.text();
    assert!(logs.contains("WARN"));
    assert!(logs.contains("discarding unreachable pool"));
}
