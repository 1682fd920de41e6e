//! Map type used for per-path memoization.
//!
//! With the `gxhash` feature the verdict cache hashes paths with gxhash, which
//! needs AES-NI/SSE2. Without it the std map is used so the crate still builds
//! on targets lacking those intrinsics. Construct with `HashMap::default()`,
//! which both backends provide.

/// Path-keyed map, gxhash-backed when the feature is enabled
#[cfg(feature = "gxhash")]
pub type HashMap<K, V> = gxhash::HashMap<K, V>;

/// Path-keyed map, gxhash-backed when the feature is enabled
#[cfg(not(feature = "gxhash"))]
pub type HashMap<K, V> = std::collections::HashMap<K, V>;
