pub mod clock;
pub mod id;

pub use clock::now_millis;
