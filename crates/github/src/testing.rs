//! Fixture key pair for tests. Never use outside tests.

pub const PRIVATE_KEY_PEM: &str = include_str!("testdata/app_key.pem");
pub const PUBLIC_KEY_PEM: &str = include_str!("testdata/app_key.pub.pem");
