use capital_weather_lake::analyzers::{project_2d, standardize, KMeans};
use capital_weather_lake::models::{RawRecord, StagingRecord, WeatherObservation};
use capital_weather_lake::processors::{BatchRow, DataMerger, IntegrityChecker, IntegrityReport};
use capital_weather_lake::utils::TemperatureUnit;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;

// Synthetic observations spread over a range of climates
fn create_observations(capitals: usize, batches: usize) -> Vec<(String, WeatherObservation)> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut observations = Vec::with_capacity(capitals * batches);

    for batch in 0..batches {
        let observed_at = base + Duration::hours(batch as i64);
        let batch_key = format!("{}", observed_at.format("%Y%m%dT%H%M%S%.3fZ"));

        for i in 0..capitals {
            let band = (i % 5) as f64;
            observations.push((
                batch_key.clone(),
                WeatherObservation {
                    capital_key: format!("C{:04}", i),
                    country_name: format!("Country {}", i),
                    capital_name: format!("Capital {}", i),
                    latitude: -60.0 + (i % 120) as f64,
                    longitude: -170.0 + (i % 340) as f64,
                    temperature: 250.0 + band * 12.0 + batch as f64 * 0.1,
                    feels_like: None,
                    temp_min: Some(248.0 + band * 12.0),
                    temp_max: Some(254.0 + band * 12.0),
                    humidity: 20.0 + band * 15.0,
                    pressure: 995.0 + band * 5.0,
                    sea_level: None,
                    grnd_level: None,
                    wind_speed: 1.0 + band,
                    wind_direction: Some(180.0),
                    cloud_cover: Some(40.0),
                    visibility: None,
                    weather_condition: "Clouds".to_string(),
                    weather_description: "scattered clouds".to_string(),
                    sunrise: None,
                    sunset: None,
                    timezone_offset: 3600,
                    observed_at,
                    temperature_unit: TemperatureUnit::Kelvin,
                },
            ));
        }
    }

    observations
}

fn batch_rows(observations: &[(String, WeatherObservation)]) -> Vec<BatchRow> {
    let checker = IntegrityChecker::new();
    let mut report = IntegrityReport::default();
    observations
        .iter()
        .filter_map(|(batch, observation)| {
            checker
                .check_row(RawRecord::from(observation.clone()), &mut report)
                .map(|record| BatchRow {
                    batch: batch.clone(),
                    record,
                })
        })
        .collect()
}

fn feature_matrix(records: &[StagingRecord]) -> Array2<f64> {
    let values: Vec<f64> = records.iter().flat_map(|r| r.features()).collect();
    Array2::from_shape_vec((records.len(), 4), values).unwrap()
}

fn benchmark_integrity_checker(c: &mut Criterion) {
    let observations = create_observations(200, 1);

    c.bench_function("integrity_checker", |b| {
        b.iter(|| black_box(batch_rows(&observations).len()))
    });
}

fn benchmark_staging_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("staging_merge_by_batches");

    for &batches in &[1, 10, 50] {
        let rows = batch_rows(&create_observations(200, batches));
        group.bench_with_input(BenchmarkId::new("batches", batches), &rows, |b, rows| {
            b.iter(|| {
                let (records, duplicates) = DataMerger::new().merge(rows.clone());
                black_box((records.len(), duplicates))
            })
        });
    }
    group.finish();
}

fn benchmark_kmeans(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_by_rows");

    for &capitals in &[50, 250, 1000] {
        let rows = batch_rows(&create_observations(capitals, 1));
        let (records, _) = DataMerger::new().merge(rows);
        let (scaled, _) = standardize(&feature_matrix(&records));

        group.bench_with_input(BenchmarkId::new("rows", capitals), &scaled, |b, scaled| {
            b.iter(|| {
                let fit = KMeans::new(4).fit(scaled).unwrap();
                black_box(fit.inertia)
            })
        });
    }
    group.finish();
}

fn benchmark_projection(c: &mut Criterion) {
    let rows = batch_rows(&create_observations(250, 1));
    let (records, _) = DataMerger::new().merge(rows);
    let (scaled, _) = standardize(&feature_matrix(&records));

    c.bench_function("project_2d", |b| b.iter(|| black_box(project_2d(&scaled))));
}

criterion_group!(
    benches,
    benchmark_integrity_checker,
    benchmark_staging_merge,
    benchmark_kmeans,
    benchmark_projection
);
criterion_main!(benches);
