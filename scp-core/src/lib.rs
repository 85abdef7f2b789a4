pub mod curl;
pub mod gct;
pub mod hca;
pub mod model;
pub mod number;
pub mod plot;
pub mod stats;
