mod enet;

pub use enet::{RADIUS, enet_norm, enet_projection, enet_scale, scaled_rows};
