//! Request middleware that runs before the proxy handler.
//!
//! Order on the way in: `scheme` (decide the client-facing scheme), then
//! `redirect` (answer `www.` hosts that should be redirected).

pub mod redirect;
pub mod scheme;

pub use redirect::redirect_www;
pub use scheme::{forwarded_scheme, scheme_from_headers, ForwardedScheme};
