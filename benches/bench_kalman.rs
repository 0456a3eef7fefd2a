use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use ssf_rs::filter::{CkmsFilter, CkmsState, DiffuseFilter, OrdinaryFilter};
use ssf_rs::model::ArimaModel;
use ssf_rs::polynomial::apply_filter;
use ssf_rs::ssf::{arima, arma::ArmaSsf};

fn airline_log() -> Vec<f64> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/airline.json");
    let data = std::fs::read_to_string(path).expect("fixtures file not found");
    let json: serde_json::Value = serde_json::from_str(&data).expect("invalid JSON");
    json["airline"]["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|v| v.as_f64().expect("number").ln())
        .collect()
}

fn bench_filters(c: &mut Criterion) {
    let y = airline_log();
    let model = ArimaModel::airline(12, -0.6, -0.8).unwrap();
    let w = apply_filter(&model.diff, &y);
    let arma = ArmaSsf::new(&model.stationary()).unwrap().into_ssf().unwrap();
    let full = arima::ssf(&model).unwrap();

    c.bench_function("ordinary_airline_differenced", |b| {
        b.iter(|| OrdinaryFilter::default().process(black_box(&arma), black_box(&w)).unwrap())
    });
    c.bench_function("ckms_airline_differenced", |b| {
        b.iter(|| {
            let initial = CkmsState::stationary(&arma).unwrap();
            CkmsFilter::default()
                .process(black_box(&arma), black_box(&w), initial)
                .unwrap()
        })
    });
    c.bench_function("diffuse_airline_levels", |b| {
        b.iter(|| DiffuseFilter::default().process(black_box(&full), black_box(&y)).unwrap())
    });
}

criterion_group!(benches, bench_filters);
criterion_main!(benches);
