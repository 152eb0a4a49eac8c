pub mod check;

pub use check::{unquote, Check, CheckCommon, ProcessCheck, Program, ServiceCheck};
