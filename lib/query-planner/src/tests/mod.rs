pub mod testkit;
mod variables;
