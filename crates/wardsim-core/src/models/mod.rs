pub mod cache;
pub mod case;
pub mod feedback;
pub mod message;
pub mod osce;
pub mod progress;
pub mod result;
