pub mod identity;
pub mod lifecycle;
pub mod matching;
pub mod scoring;
pub mod transitions;
