//! Backend persistence for review annotations
//!
//! [`Gateway`] implements [`annotator_core::AnnotationStore`] over the review
//! backend's JSON API and uploads flattened PDF exports. Requests go through
//! the [`Transport`] trait; [`UreqTransport`] is the HTTP implementation.

pub mod config;
pub mod gateway;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, GatewayConfig, BASE_URL_ENV};
pub use gateway::{Gateway, GatewayError, SaveReceipt};
pub use transport::{Body, Method, MultipartForm, Request, Transport, TransportError, UreqTransport};
pub use wire::CodecError;
