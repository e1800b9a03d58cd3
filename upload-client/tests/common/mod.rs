// Not every helper is used in every test, so we allow dead code
#![allow(unused_imports, dead_code)]

mod stub_server;
pub use stub_server::*;
mod utils;
pub use utils::*;
