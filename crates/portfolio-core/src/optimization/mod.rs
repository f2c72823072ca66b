pub mod frontier;
pub mod mean_variance;
