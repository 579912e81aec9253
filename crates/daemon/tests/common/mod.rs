#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bucketfs_daemon::{BucketFs, Config};
use common::client::MemoryClient;
use common::object::ObjectIdentity;
use tempfile::TempDir;

pub struct TestFs {
    pub fs: BucketFs,
    pub client: Arc<MemoryClient>,
    _dir: TempDir,
}

impl Drop for TestFs {
    fn drop(&mut self) {
        self.fs.unmount();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn config() -> Config {
    Config {
        delayed_workers: 4,
        ..Default::default()
    }
}

/// Two buckets:
///
/// - `docs`: `readme.txt`, `reports/q1.csv`, `reports/q2.csv`, `empty/` (marker)
/// - `photos`: `cat.jpg`
pub fn setup() -> TestFs {
    setup_with(config())
}

pub fn setup_with(config: Config) -> TestFs {
    init_tracing();
    let client = Arc::new(MemoryClient::new());
    client.add_bucket("docs", "us-east-1");
    client.add_bucket("photos", "eu-west-1");
    client.put_bytes("docs", "readme.txt", "read me first\n");
    client.put_bytes("docs", "reports/q1.csv", "quarter,total\n1,100\n");
    client.put_bytes("docs", "reports/q2.csv", "quarter,total\n2,250\n");
    client.put_bytes("docs", "empty/", "");
    client.put_bytes("photos", "cat.jpg", vec![0xffu8, 0xd8, 0xff, 0xe0]);
    mount(client, config)
}

pub fn mount(client: Arc<MemoryClient>, config: Config) -> TestFs {
    let dir = tempfile::tempdir().unwrap();
    let fs = BucketFs::mount(
        client.clone(),
        config,
        dir.path().join("cache"),
        dir.path().join("reports"),
    )
    .unwrap();
    TestFs {
        fs,
        client,
        _dir: dir,
    }
}

pub fn id(path: &str) -> ObjectIdentity {
    ObjectIdentity::parse_namespace_path(path).unwrap()
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}
