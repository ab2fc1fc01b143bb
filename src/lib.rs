pub mod catalog;
pub mod document;
pub mod errors;
pub mod launch;
pub mod logging;
pub mod pipelines;
pub mod server;
pub mod session;
pub mod settings;
pub mod validation;
