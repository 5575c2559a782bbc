pub mod cluster_plot;
pub mod kmeans;
pub mod projection;
pub mod weather_clusterer;

pub use cluster_plot::{render_scatter, PlotPoint};
pub use kmeans::{silhouette_score, KMeans, KMeansFit};
pub use projection::{project_2d, standardize, Standardization};
pub use weather_clusterer::{CuratedClusterer, CuratedDataset};
