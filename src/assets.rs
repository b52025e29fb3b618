//! Script Payloads
//!
//! The three Swerve scripts are opaque blobs pinned at build time and served
//! verbatim. The bootstrap script carries the key placeholder.

use std::borrow::Cow;

use crate::hashing::{sri_hash, HashVariant};

pub const CLIENT_JAVASCRIPT: &[u8] = include_bytes!("../assets/swerve.client.js");
pub const BOOTSTRAP_JAVASCRIPT: &[u8] = include_bytes!("../assets/swerve.bootstrap.js");
pub const CORE_JAVASCRIPT: &[u8] = include_bytes!("../assets/swerve.core.js");

#[derive(Debug, Clone)]
pub struct Assets {
    pub client: Cow<'static, [u8]>,
    pub bootstrap: Cow<'static, [u8]>,
    pub core: Cow<'static, [u8]>,
}

impl Assets {
    /// Integrity hashes of the scripts served verbatim.
    ///
    /// The bootstrap body differs per request, so it is never included.
    pub fn static_hashes(&self, variant: HashVariant) -> Vec<String> {
        vec![sri_hash(variant, &self.client), sri_hash(variant, &self.core)]
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            client: Cow::Borrowed(CLIENT_JAVASCRIPT),
            bootstrap: Cow::Borrowed(BOOTSTRAP_JAVASCRIPT),
            core: Cow::Borrowed(CORE_JAVASCRIPT),
        }
    }
}
