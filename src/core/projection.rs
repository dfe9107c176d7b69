//! Local planar frame for metric buffering.
//!
//! Input layers are WGS84 lon/lat. Buffer distances are linear, so geometry is
//! moved into an equirectangular plane (metres) centred on the study area,
//! processed there, and mapped back. Within a county-sized extent the scale
//! error stays well below a buffer's rounding.

use geo::{Coord, MapCoords, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: Coord<f64>,
    meters_per_degree_lon: f64,
    meters_per_degree_lat: f64,
}

impl LocalProjection {
    pub fn new(origin_lon: f64, origin_lat: f64) -> Self {
        let phi = origin_lat.to_radians();
        // WGS84 series for the length of one degree at latitude phi
        let meters_per_degree_lat =
            111_132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
                - 0.0023 * (6.0 * phi).cos();
        let meters_per_degree_lon =
            111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos() + 0.118 * (5.0 * phi).cos();

        Self {
            origin: Coord {
                x: origin_lon,
                y: origin_lat,
            },
            meters_per_degree_lon,
            meters_per_degree_lat,
        }
    }

    pub fn centered_on(extent: Rect<f64>) -> Self {
        let center = extent.center();
        Self::new(center.x, center.y)
    }

    pub fn origin(&self) -> Coord<f64> {
        self.origin
    }

    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.meters_per_degree_lon,
            y: (c.y - self.origin.y) * self.meters_per_degree_lat,
        }
    }

    pub fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: c.x / self.meters_per_degree_lon + self.origin.x,
            y: c.y / self.meters_per_degree_lat + self.origin.y,
        }
    }

    pub fn project<G: MapCoords<f64, f64, Output = G>>(&self, geometry: &G) -> G {
        geometry.map_coords(|c| self.forward(c))
    }

    pub fn unproject<G: MapCoords<f64, f64, Output = G>>(&self, geometry: &G) -> G {
        geometry.map_coords(|c| self.inverse(c))
    }
}
