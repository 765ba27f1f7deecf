//! Criterion benchmarks for the credential codec: encrypt, decrypt.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memberlink_core::Credentials;
use memberlink_crypto::{CredentialCipher, EncryptionKey};

fn sample() -> Credentials {
    Credentials::bearer(
        "a".repeat(40),
        "r".repeat(40),
        Utc::now(),
    )
}

fn bench_encrypt(c: &mut Criterion) {
    let cipher = CredentialCipher::new(&EncryptionKey::generate());
    let creds = sample();
    let mut g = c.benchmark_group("encrypt");
    g.throughput(Throughput::Elements(1));
    g.bench_function("encrypt_credentials", |b| {
        b.iter(|| black_box(cipher.encrypt(&creds)).unwrap());
    });
    g.finish();
}

fn bench_decrypt(c: &mut Criterion) {
    let cipher = CredentialCipher::new(&EncryptionKey::generate());
    let sealed = cipher.encrypt(&sample()).unwrap();
    let mut g = c.benchmark_group("decrypt");
    g.throughput(Throughput::Elements(1));
    g.bench_function("decrypt_credentials", |b| {
        b.iter(|| black_box(cipher.decrypt(&sealed)).unwrap());
    });
    g.finish();
}

criterion_group!(benches, bench_encrypt, bench_decrypt);
criterion_main!(benches);
