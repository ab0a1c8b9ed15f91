pub mod client;

pub use client::{CloudImageClient, ImageGenerator};
