pub mod jvm;
pub mod util;
