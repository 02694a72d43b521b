pub mod diagnostics;
pub mod metadata;
pub mod model;
pub mod pass1;
pub mod pass2;
