//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `check`   | `Check`          |
//! | `catalog` | `Catalog`        |

pub mod catalog;
pub mod check;
pub mod serve;

pub use catalog::cmd_catalog;
pub use check::cmd_check;
pub use serve::{ServeArgs, cmd_serve};
