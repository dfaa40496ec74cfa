#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use souk_core::Identity;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn id(value: &str) -> Identity {
    Identity::new(value).unwrap()
}

/// Awaits `fut`, failing the test if it takes longer than [`WAIT`].
pub async fn within<F: Future>(what: &str, fut: F) -> F::Output {
    match tokio::time::timeout(WAIT, fut).await {
        Ok(value) => value,
        Err(_) => panic!("{what}: not reached within {WAIT:?}"),
    }
}

pub fn write_config(data_dir: &Path, value: serde_json::Value) {
    std::fs::create_dir_all(data_dir).unwrap();
    let path = data_dir.join(souk_core::CONFIG_FILE_NAME);
    std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}
