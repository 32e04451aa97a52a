//! Schema resolution and response materialization.
//!
//! - [`resolve`] turns a call site plus a declaration [`scope::Lookup`] into a [`schema::Schema`]
//! - [`emit`] projects a schema to the JSON Schema shown to the generator
//! - [`repair`] and [`materialize`] turn generator text back into a [`materialize::TypedValue`]
//! - [`cache`] keeps compiled artifacts until a file they depend on changes
pub mod cache;
pub mod call_site;
pub mod config;
pub mod emit;
pub mod error;
pub mod materialize;
pub mod path_de;
pub mod program;
pub mod repair;
pub mod resolve;
pub mod schema;
pub mod scope;
pub mod syntax;

use std::sync::Once;

pub use call_site::{CallSite, CallSiteIdentity, Locus};
pub use error::{CacheError, ConversionError, ResolveError, WireError};
pub use materialize::{Mode, TypedValue};
pub use resolve::SchemaResolver;
pub use schema::Schema;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=json_shape=debug`;
/// output goes to stderr.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(filter)
                .init();
        }
    });
}
