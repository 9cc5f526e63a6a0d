//! Advisory locking around connect and disconnect.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thermcam::config::ThermCamConfig;
use thermcam::error::ConnectError;
use thermcam::serial::lock::encode_pid;
use thermcam::serial::{lock_file_path, DeviceLock, ProcessProbe};
use thermcam::ThermCam;

struct FixedProbe(bool);

impl ProcessProbe for FixedProbe {
    fn is_alive(&self, _pid: i32) -> bool {
        self.0
    }
}

fn config_with_lock_dir(dir: &Path) -> ThermCamConfig {
    let mut config = ThermCamConfig::default();
    config.serial.lock_dir = dir.to_path_buf();
    config
}

/// A stand-in device node: any existing file passes the existence check.
fn fake_device(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"").unwrap();
    path
}

#[test]
fn test_live_owner_blocks_and_dead_owner_is_replaced() {
    let devices = TempDir::new().unwrap();
    let locks = TempDir::new().unwrap();
    let device = fake_device(&devices, "ttyACM0");
    let lock_path = lock_file_path(locks.path(), &device);

    fs::write(&lock_path, encode_pid(4242)).unwrap();
    let err = DeviceLock::acquire_with(&device, locks.path(), 1000, &FixedProbe(true)).unwrap_err();
    assert!(matches!(err, ConnectError::DeviceLocked(4242)));
    assert_eq!(fs::read_to_string(&lock_path).unwrap(), encode_pid(4242));

    let lock = DeviceLock::acquire_with(&device, locks.path(), 1000, &FixedProbe(false)).unwrap();
    assert_eq!(fs::read_to_string(&lock_path).unwrap(), "      1000\n");
    lock.release().unwrap();
    assert!(!lock_path.exists());
}

#[test]
fn test_garbage_lock_contents_are_stale() {
    let devices = TempDir::new().unwrap();
    let locks = TempDir::new().unwrap();
    let device = fake_device(&devices, "ttyUSB3");
    let lock_path = lock_file_path(locks.path(), &device);
    fs::write(&lock_path, "not a pid").unwrap();

    let lock = DeviceLock::acquire_with(&device, locks.path(), 77, &FixedProbe(true)).unwrap();
    assert_eq!(lock.path(), lock_path.as_path());
    drop(lock);
    assert!(!lock_path.exists());
}

#[tokio::test]
async fn test_connect_missing_device_leaves_no_lock() {
    let locks = TempDir::new().unwrap();
    let mut cam = ThermCam::new(&config_with_lock_dir(locks.path()));
    let device = locks.path().join("ttyNOPE");

    let err = cam.connect(&device).await.unwrap_err();
    assert!(matches!(err, ConnectError::NotFound(path) if path == device));
    assert!(!cam.is_connected());
    assert_eq!(fs::read_dir(locks.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_connect_refuses_device_locked_by_live_process() {
    let devices = TempDir::new().unwrap();
    let locks = TempDir::new().unwrap();
    let device = fake_device(&devices, "ttyACM1");
    let lock_path = lock_file_path(locks.path(), &device);
    let own_pid = std::process::id() as i32;
    fs::write(&lock_path, encode_pid(own_pid)).unwrap();

    let mut cam = ThermCam::new(&config_with_lock_dir(locks.path()));
    let err = cam.connect(&device).await.unwrap_err();
    assert!(matches!(err, ConnectError::DeviceLocked(pid) if pid == own_pid));
    assert!(!cam.is_connected());
    // someone else's lock is left alone
    assert!(lock_path.exists());
}

#[tokio::test]
async fn test_failed_open_releases_lock() {
    let devices = TempDir::new().unwrap();
    let locks = TempDir::new().unwrap();
    // a regular file cannot be configured as a serial line
    let device = fake_device(&devices, "ttyFILE");

    let mut cam = ThermCam::new(&config_with_lock_dir(locks.path()));
    assert!(cam.connect(&device).await.is_err());
    assert!(!cam.is_connected());
    assert!(!lock_file_path(locks.path(), &device).exists());
}

#[tokio::test]
async fn test_disconnect_releases_attached_lock() {
    let devices = TempDir::new().unwrap();
    let locks = TempDir::new().unwrap();
    let device = fake_device(&devices, "ttyACM2");
    let lock = DeviceLock::acquire(&device, locks.path()).unwrap();
    let lock_path = lock.path().to_path_buf();

    let mut cam = ThermCam::new(&config_with_lock_dir(locks.path()));
    let (host, _device_end) = tokio::io::duplex(256);
    let _reader = cam.attach(Box::new(host), Some(lock), &device);
    assert!(cam.is_connected());
    assert!(lock_path.exists());

    cam.disconnect().await;
    assert!(!cam.is_connected());
    assert!(!lock_path.exists());
}
