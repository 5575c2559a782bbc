use ndarray::Array2;
use std::sync::Arc;
use tracing::info;

use crate::analyzers::cluster_plot::{render_scatter, PlotPoint};
use crate::analyzers::kmeans::{silhouette_score, KMeans};
use crate::analyzers::projection::{project_2d, standardize};
use crate::config::ClusteringConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{
    cluster_name, ClusterAssignment, ClusterProfile, ClusteringSummary, CuratedRecord,
    StagingRecord, UNKNOWN_CLUSTER,
};
use crate::storage::ObjectTierStore;
use crate::utils::constants::{CURATED_OBJECT, CURATED_PLOT_OBJECT, STAGING_OBJECT};
use crate::writers::csv_codec::{decode_all, encode_records, CURATED_COLUMNS};

/// Number of clustering features per row
const FEATURES: usize = 4;

/// Clustered staging rows plus run diagnostics
#[derive(Debug, Clone)]
pub struct CuratedDataset {
    pub records: Vec<CuratedRecord>,
    pub summary: ClusteringSummary,
}

impl CuratedDataset {
    pub fn plot_points(&self) -> Vec<PlotPoint> {
        self.records
            .iter()
            .map(|record| PlotPoint {
                x: record.projection_x,
                y: record.projection_y,
                cluster_id: record.cluster_id,
            })
            .collect()
    }
}

/// Groups staging rows into `k` weather regimes and publishes the curated tier
pub struct CuratedClusterer {
    store: Arc<dyn ObjectTierStore>,
    staging_bucket: String,
    curated_bucket: String,
    config: ClusteringConfig,
}

impl CuratedClusterer {
    pub fn new(
        store: Arc<dyn ObjectTierStore>,
        staging_bucket: &str,
        curated_bucket: &str,
        config: ClusteringConfig,
    ) -> Self {
        Self {
            store,
            staging_bucket: staging_bucket.to_string(),
            curated_bucket: curated_bucket.to_string(),
            config,
        }
    }

    pub async fn load_staging(&self) -> Result<Vec<StagingRecord>> {
        let bytes = self.store.get(&self.staging_bucket, STAGING_OBJECT).await?;
        decode_all(&bytes).map_err(|e| ProcessingError::StorageRead {
            bucket: self.staging_bucket.clone(),
            key: STAGING_OBJECT.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read staging, cluster it, and write the curated CSV followed by the plot
    pub async fn curate(&self) -> Result<CuratedDataset> {
        let staging = self.load_staging().await?;
        info!(
            "Clustering {} staging rows into {} clusters",
            staging.len(),
            self.config.k
        );

        let dataset = self.cluster(staging)?;

        let points = dataset.plot_points();
        let png = tokio::task::spawn_blocking(move || render_scatter(&points)).await??;
        let csv = encode_records(&dataset.records, CURATED_COLUMNS)?;

        self.store.put(&self.curated_bucket, CURATED_OBJECT, csv).await?;
        self.store
            .put(&self.curated_bucket, CURATED_PLOT_OBJECT, png)
            .await?;

        info!(
            "Curated tier updated: {}/{} and {}/{}",
            self.curated_bucket, CURATED_OBJECT, self.curated_bucket, CURATED_PLOT_OBJECT
        );
        Ok(dataset)
    }

    /// Cluster staging rows. Pure: the result depends only on the rows (in
    /// any order), k and the seed.
    pub fn cluster(&self, mut staging: Vec<StagingRecord>) -> Result<CuratedDataset> {
        let k = self.config.k;
        let rows = staging.len();
        if rows < k {
            return Err(ProcessingError::InsufficientData { rows, k });
        }

        staging.sort_by(|a, b| a.capital_key.cmp(&b.capital_key));

        let features = feature_matrix(&staging)?;
        let (scaled, _) = standardize(&features);

        let fit = KMeans::from_config(&self.config).fit(&scaled)?;
        let projection = project_2d(&scaled);
        let silhouette = silhouette_score(&scaled, &fit.labels);

        let profiles = cluster_profiles(&features, &fit.labels, k);
        let names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
        let summary = ClusteringSummary {
            rows,
            k,
            inertia: fit.inertia,
            silhouette,
            profiles,
        };
        info!(
            "k-means converged in {} iterations, inertia {:.4}, silhouette {}",
            fit.iterations,
            fit.inertia,
            silhouette.map_or("n/a".to_string(), |s| format!("{:.4}", s))
        );
        info!("{}", summary.summary());

        let records = staging
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                CuratedRecord::new(
                    record,
                    ClusterAssignment {
                        cluster_id: fit.labels[i],
                        cluster_name: names[fit.labels[i]].clone(),
                        projection_x: projection[[i, 0]],
                        projection_y: projection[[i, 1]],
                    },
                )
            })
            .collect();

        Ok(CuratedDataset { records, summary })
    }
}

fn feature_matrix(records: &[StagingRecord]) -> Result<Array2<f64>> {
    let values: Vec<f64> = records.iter().flat_map(|r| r.features()).collect();
    Array2::from_shape_vec((records.len(), FEATURES), values)
        .map_err(|e| ProcessingError::InvalidFormat(format!("feature matrix: {}", e)))
}

/// Size, mean feature values (original units) and name of each cluster
fn cluster_profiles(features: &Array2<f64>, labels: &[usize], k: usize) -> Vec<ClusterProfile> {
    let mut profiles: Vec<ClusterProfile> = (0..k)
        .map(|cluster_id| ClusterProfile {
            cluster_id,
            name: UNKNOWN_CLUSTER.to_string(),
            size: 0,
            centroid: [0.0; FEATURES],
        })
        .collect();

    for (row, &label) in features.outer_iter().zip(labels) {
        let profile = &mut profiles[label];
        profile.size += 1;
        for (total, value) in profile.centroid.iter_mut().zip(row.iter()) {
            *total += value;
        }
    }

    for profile in &mut profiles {
        if profile.size > 0 {
            for value in profile.centroid.iter_mut() {
                *value /= profile.size as f64;
            }
            profile.name = cluster_name(&profile.centroid);
        }
    }

    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StagingValues;
    use crate::storage::MemoryObjectStore;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn record(key: &str, temperature: f64, humidity: f64, pressure: f64, wind: f64) -> StagingRecord {
        let values = StagingValues {
            capital_key: key.to_string(),
            country_name: key.to_string(),
            capital_name: key.to_string(),
            latitude: 10.0,
            longitude: 10.0,
            temperature,
            feels_like: None,
            temp_min: None,
            temp_max: None,
            humidity,
            pressure,
            sea_level_pressure: None,
            ground_level_pressure: None,
            wind_speed: wind,
            wind_direction: None,
            cloud_cover: None,
            visibility: None,
            weather_condition: "Clear".to_string(),
            weather_description: "clear sky".to_string(),
            sunrise: None,
            sunset: None,
            observed_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            timezone_offset: 0,
        };
        StagingRecord::from_values(values).unwrap()
    }

    fn staging() -> Vec<StagingRecord> {
        vec![
            record("AE", 38.0, 20.0, 1005.0, 4.0),
            record("EG", 35.0, 25.0, 1008.0, 5.0),
            record("FI", -8.0, 85.0, 1022.0, 6.0),
            record("IS", -3.0, 80.0, 1018.0, 12.0),
            record("NO", -6.0, 88.0, 1020.0, 8.0),
            record("SA", 40.0, 15.0, 1004.0, 3.0),
        ]
    }

    fn clusterer(store: Arc<dyn ObjectTierStore>, k: usize) -> CuratedClusterer {
        let config = ClusteringConfig {
            k,
            ..ClusteringConfig::default()
        };
        CuratedClusterer::new(store, "staging", "curated", config)
    }

    fn mapping(dataset: &CuratedDataset) -> BTreeMap<String, usize> {
        dataset
            .records
            .iter()
            .map(|r| (r.capital_key.clone(), r.cluster_id))
            .collect()
    }

    #[test]
    fn test_cluster_separates_climates() -> Result<()> {
        let dataset = clusterer(Arc::new(MemoryObjectStore::new()), 2).cluster(staging())?;
        let mapping = mapping(&dataset);

        assert_eq!(mapping["AE"], 0);
        assert_eq!(mapping["EG"], 0);
        assert_eq!(mapping["SA"], 0);
        assert_eq!(mapping["FI"], 1);
        assert_eq!(mapping["IS"], 1);
        assert_eq!(mapping["NO"], 1);
        assert_eq!(dataset.summary.profiles[0].size, 3);
        assert!(dataset.summary.profiles[0].centroid[0] > 30.0);
        assert_eq!(dataset.summary.profiles[0].name, "Hot & Dry");
        assert_eq!(dataset.summary.profiles[1].name, "Freezing & Humid");
        for record in &dataset.records {
            assert_eq!(
                record.cluster_name,
                dataset.summary.profiles[record.cluster_id].name
            );
        }
        Ok(())
    }

    #[test]
    fn test_cluster_is_deterministic_and_order_independent() -> Result<()> {
        let clusterer = clusterer(Arc::new(MemoryObjectStore::new()), 3);
        let mut reversed = staging();
        reversed.reverse();

        let first = clusterer.cluster(staging())?;
        let second = clusterer.cluster(staging())?;
        let third = clusterer.cluster(reversed)?;

        assert_eq!(mapping(&first), mapping(&second));
        assert_eq!(mapping(&first), mapping(&third));
        assert_eq!(first.records, third.records);
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_data_writes_nothing() -> Result<()> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("staging").await?;
        store.ensure_bucket("curated").await?;

        let csv = encode_records(&staging()[..2], crate::writers::csv_codec::STAGING_COLUMNS)?;
        store.put("staging", STAGING_OBJECT, csv).await?;

        let result = clusterer(store.clone(), 4).curate().await;
        assert!(matches!(
            result,
            Err(ProcessingError::InsufficientData { rows: 2, k: 4 })
        ));
        assert!(store.list("curated").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_curate_writes_csv_and_png() -> Result<()> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("staging").await?;
        store.ensure_bucket("curated").await?;
        let csv = encode_records(&staging(), crate::writers::csv_codec::STAGING_COLUMNS)?;
        store.put("staging", STAGING_OBJECT, csv).await?;

        let dataset = clusterer(store.clone(), 2).curate().await?;

        let bytes = store.get("curated", CURATED_OBJECT).await?;
        let header = String::from_utf8_lossy(&bytes).lines().next().unwrap_or_default().to_string();
        assert!(header.ends_with("cluster_id,cluster_name,projection_x,projection_y"));

        let stored: Vec<CuratedRecord> = decode_all(&bytes)?;
        assert_eq!(stored, dataset.records);
        let png = store.get("curated", CURATED_PLOT_OBJECT).await?;
        assert_eq!(&png[1..4], b"PNG");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_staging_object() -> Result<()> {
        let store = Arc::new(MemoryObjectStore::new());
        store.ensure_bucket("staging").await?;

        assert!(matches!(
            clusterer(store, 2).curate().await,
            Err(ProcessingError::ObjectNotFound { .. })
        ));
        Ok(())
    }
}
