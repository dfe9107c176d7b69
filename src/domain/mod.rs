// Domain layer: features, layers, units and the ports the adapters implement.

pub mod model;
pub mod ports;
