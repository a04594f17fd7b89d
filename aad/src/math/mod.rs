pub mod ad;
pub mod gaussians;
