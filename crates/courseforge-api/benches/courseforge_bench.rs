//! Criterion microbenchmarks for courseforge-api hot paths.
//!
//! Run with:
//!   cargo bench -p courseforge-api
//!
//! HTML reports are written to `target/criterion/`.

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use courseforge_common::{audience, drip::DripPolicy, payments, schedule};

// ── Schedules ─────────────────────────────────────────────────────────────────

fn bench_parse_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule/parse");

    for text in ["every day at 9am", "every weekday at 17:30", "every thursday at 8:15pm"] {
        group.bench_with_input(BenchmarkId::from_parameter(text), text, |b, t| {
            b.iter(|| schedule::parse_schedule(black_box(t)).unwrap())
        });
    }

    group.finish();
}

fn bench_next_run(c: &mut Criterion) {
    let parsed = schedule::parse_schedule("every weekday at 9am").unwrap();
    let tz = schedule::parse_timezone("America/New_York").unwrap();
    let after = Utc.with_ymd_and_hms(2025, 3, 7, 15, 0, 0).unwrap();

    c.bench_function("schedule/next_run", |b| {
        b.iter(|| parsed.next_run(black_box(after), tz))
    });

    c.bench_function("schedule/upcoming_10", |b| {
        b.iter(|| parsed.upcoming(black_box(after), tz, 10))
    });
}

// ── Drip ──────────────────────────────────────────────────────────────────────

fn bench_drip_status(c: &mut Criterion) {
    let policy = DripPolicy::DaysAfterEnrollment { days: 7 };
    let enrolled = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap();

    c.bench_function("drip/status", |b| {
        b.iter(|| policy.status(black_box(enrolled), black_box(now)))
    });
}

// ── Audience hashing ──────────────────────────────────────────────────────────

fn bench_hash_audience(c: &mut Criterion) {
    let mut group = c.benchmark_group("audience/hash");

    for size in [100usize, 1_000, 10_000] {
        let emails: Vec<String> = (0..size).map(|i| format!("  Student{i}@Example.com ")).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &emails, |b, e| {
            b.iter(|| audience::hash_audience(e.iter().map(String::as_str), 1_000))
        });
    }

    group.finish();
}

// ── Payment webhooks ──────────────────────────────────────────────────────────

fn bench_verify_signature(c: &mut Criterion) {
    let secret = "whsec_bench_secret";
    let body = br#"{"type":"checkout.completed","data":{"order_id":"01929a5e-6e1b-7000-9c4a-dead00000001","amount_cents":4900}}"#;
    let timestamp = 1_700_000_000;
    let header = payments::signature_header(secret, timestamp, body).unwrap();

    c.bench_function("payments/verify_signature", |b| {
        b.iter(|| payments::verify_signature(secret, black_box(&header), black_box(body), timestamp, 300).unwrap())
    });
}

// ── Argon2 password hashing ───────────────────────────────────────────────────

fn bench_argon2(c: &mut Criterion) {
    c.bench_function("auth/argon2_hash", |b| {
        b.iter(|| courseforge_api::auth::hash_password(black_box("hunter2-password-bench")).unwrap())
    });

    let hash = courseforge_api::auth::hash_password("hunter2-password-bench").unwrap();
    c.bench_function("auth/argon2_verify", |b| {
        b.iter(|| courseforge_api::auth::verify_password(black_box("hunter2-password-bench"), &hash).unwrap())
    });
}

// ── criterion entrypoints ─────────────────────────────────────────────────────

criterion_group!(scheduling, bench_parse_schedule, bench_next_run, bench_drip_status);

criterion_group!(hashing, bench_hash_audience, bench_verify_signature);

criterion_group!(auth, bench_argon2);

criterion_main!(scheduling, hashing, auth);
