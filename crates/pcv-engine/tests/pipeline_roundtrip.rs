//! End-to-end pipeline runs against real files.
//!
//! KDF costs are lowered so each run takes milliseconds; the container
//! layout does not depend on them.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use secrecy::SecretString;
use tempfile::TempDir;

use pcv_core::{ErrorKind, Outcome, Progress, ProgressFn};
use pcv_crypto::container::FIXED_OVERHEAD;
use pcv_crypto::{derive_key, Field, FieldCodecs, KdfParams, Layout, OpenedContainer, CHUNK_SIZE};
use pcv_engine::{Job, Pipeline, RunState, StateFn};

const MIB: usize = CHUNK_SIZE;

fn cheap_kdf() -> KdfParams {
    KdfParams {
        mem_cost_kib: 64,
        time_cost: 1,
        parallelism: 1,
    }
}

fn pw(s: &str) -> SecretString {
    SecretString::from(s)
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 5)) as u8)
        .collect()
}

fn write_input(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write test input");
    path
}

fn encrypt(input: &Path, password: &str, fast: bool) -> PathBuf {
    let job = Job::encrypt(input, pw(password))
        .fast(fast)
        .metadata("test container")
        .kdf(cheap_kdf());
    let output = job.resolved_output();
    let outcome = Pipeline::new(job).run();
    assert!(outcome.is_done(), "encrypt failed: {outcome:?}");
    output
}

fn decrypt_to(container: &Path, output: &Path, password: &str, keep: bool) -> Outcome {
    let job = Job::decrypt(container, pw(password))
        .output(output)
        .keep_corrupted(keep)
        .kdf(cheap_kdf());
    Pipeline::new(job).run()
}

fn summary(outcome: Outcome) -> pcv_core::RunSummary {
    match outcome {
        Outcome::Done(summary) => summary,
        other => panic!("expected Done, got {other:?}"),
    }
}

fn read_container(path: &Path) -> OpenedContainer {
    let bytes = fs::read(path).unwrap();
    let codecs = FieldCodecs::new().unwrap();
    OpenedContainer::read(&mut Cursor::new(&bytes), bytes.len() as u64, &codecs).unwrap()
}

#[test]
fn secure_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(MIB + MIB / 2);
    let input = write_input(tmp.path(), "plain.bin", &data);

    let container = encrypt(&input, "correct horse", false);
    assert_eq!(container, tmp.path().join("plain.bin.pcv"));

    let out = tmp.path().join("restored.bin");
    let done = summary(decrypt_to(&container, &out, "correct horse", false));
    assert_eq!(done.chunks, 2);
    assert_eq!(done.bytes, data.len() as u64);
    assert!(done.is_clean());
    assert_eq!(fs::read(&out).unwrap(), data);
}

#[test]
fn fast_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(300_000);
    let input = write_input(tmp.path(), "plain.bin", &data);

    let container = encrypt(&input, "pw", true);
    assert!(read_container(&container).is_fast());

    let out = tmp.path().join("restored.bin");
    summary(decrypt_to(&container, &out, "pw", false));
    assert_eq!(fs::read(&out).unwrap(), data);
}

#[test]
fn wrong_password_leaves_no_output() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", b"top secret");
    let container = encrypt(&input, "right", false);

    let out = tmp.path().join("restored.bin");
    let outcome = decrypt_to(&container, &out, "wrong", false);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::WrongPassword));
    assert!(!out.exists(), "no output may be created for a wrong password");
}

#[test]
fn flipped_chunk_byte_fails_and_removes_output() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(10_000);
    let input = write_input(tmp.path(), "plain.bin", &data);
    let container = encrypt(&input, "pw", false);

    let mut bytes = fs::read(&container).unwrap();
    let payload = read_container(&container).layout().payload_offset() as usize;
    bytes[payload + 500] ^= 0x01;
    fs::write(&container, &bytes).unwrap();

    let out = tmp.path().join("restored.bin");
    let outcome = decrypt_to(&container, &out, "pw", false);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::CorruptChunk));
    assert!(!out.exists(), "partial output must be removed");
}

#[test]
fn keep_policy_reports_corruption() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(2 * MIB + 10);
    let input = write_input(tmp.path(), "plain.bin", &data);
    let container = encrypt(&input, "pw", false);

    let mut bytes = fs::read(&container).unwrap();
    let payload = read_container(&container).layout().payload_offset() as usize;
    bytes[payload + MIB + 16 + 7] ^= 0x20; // second chunk's ciphertext
    fs::write(&container, &bytes).unwrap();

    let out = tmp.path().join("restored.bin");
    let done = summary(decrypt_to(&container, &out, "pw", true));
    assert_eq!(done.corrupted_chunks, 1);
    assert!(!done.digest_ok);
    assert!(!done.is_clean());

    let restored = fs::read(&out).unwrap();
    assert_eq!(restored.len(), data.len());
    assert_eq!(&restored[..MIB], &data[..MIB]);
    assert_eq!(restored[MIB + 7], data[MIB + 7] ^ 0x20);
}

#[test]
fn digest_mismatch_is_integrity_failure() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(4096));
    let container = encrypt(&input, "pw", false);

    // A cleanly coded but wrong digest passes the field codec
    let mut bytes = fs::read(&container).unwrap();
    let offset = read_container(&container).layout().digest_offset() as usize;
    let codecs = FieldCodecs::new().unwrap();
    let forged = codecs.encode(Field::Digest, &[0xEE; 32]).unwrap();
    bytes[offset..offset + forged.len()].copy_from_slice(&forged);
    fs::write(&container, &bytes).unwrap();

    let out = tmp.path().join("restored.bin");
    let outcome = decrypt_to(&container, &out, "pw", false);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::IntegrityMismatch));
    assert!(!out.exists());

    let done = summary(decrypt_to(&container, &out, "pw", true));
    assert_eq!(done.corrupted_chunks, 0);
    assert!(!done.digest_ok);
}

#[test]
fn empty_input_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "empty", b"");

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let container = job.resolved_output();
    let done = summary(Pipeline::new(job).run());
    assert_eq!(done.chunks, 0);
    assert_eq!(fs::metadata(&container).unwrap().len(), FIXED_OVERHEAD);

    let out = tmp.path().join("restored");
    let done = summary(decrypt_to(&container, &out, "pw", false));
    assert_eq!(done.chunks, 0);
    assert_eq!(fs::read(&out).unwrap(), b"");
}

#[test]
fn two_mib_input_has_two_chunks() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "two.bin", &make_data(2 * MIB));

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let container = job.resolved_output();
    summary(Pipeline::new(job).run());

    let opened = read_container(&container);
    let layout = opened.layout();
    assert_eq!(layout.chunk_count, 2);
    assert_eq!(layout.table_len(), 304 + 144);
    assert_eq!(
        fs::metadata(&container).unwrap().len(),
        FIXED_OVERHEAD + 304 + (2 * MIB) as u64 + 32
    );
    assert_eq!(*layout, Layout::for_plaintext(0, (2 * MIB) as u64));
}

#[test]
fn damaged_header_bytes_are_repaired() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(50_000);
    let input = write_input(tmp.path(), "plain.bin", &data);
    let container = encrypt(&input, "pw", false);

    let layout = *read_container(&container).layout();
    let mut bytes = fs::read(&container).unwrap();
    let salt = (layout.fingerprint_offset() - 152 - 144) as usize;
    bytes[salt + 3] ^= 0xFF;
    bytes[layout.digest_offset() as usize + 10] ^= 0x42;
    bytes[layout.table_offset() as usize + 20] ^= 0x01;
    fs::write(&container, &bytes).unwrap();

    let out = tmp.path().join("restored.bin");
    summary(decrypt_to(&container, &out, "pw", false));
    assert_eq!(fs::read(&out).unwrap(), data);
}

#[test]
fn truncated_container_fails() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(1000));
    let container = encrypt(&input, "pw", false);

    let bytes = fs::read(&container).unwrap();
    fs::write(&container, &bytes[..800]).unwrap();

    let outcome = decrypt_to(&container, &tmp.path().join("out"), "pw", false);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::TruncatedInput));
}

#[test]
fn nonce_table_is_unique_and_recoverable() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(3 * MIB + 1));
    let container = encrypt(&input, "pw", false);

    let opened = read_container(&container);
    let key = derive_key(&pw("pw"), &opened.header().salt, false, &cheap_kdf()).unwrap();
    let table = opened.unlock(&key).unwrap();
    assert_eq!(table.len(), 4);

    let mut nonces: Vec<_> = table.iter().copied().collect();
    nonces.push(opened.header().header_nonce);
    nonces.sort();
    nonces.dedup();
    assert_eq!(nonces.len(), 5, "no nonce may repeat under one key");
}

#[test]
fn mode_is_inferred_from_extension() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(123);
    let input = write_input(tmp.path(), "notes.txt", &data);

    let sealed = Pipeline::new(Job::infer(&input, pw("pw")).kdf(cheap_kdf())).run();
    assert_eq!(summary(sealed).mode, Some(pcv_core::Mode::Encrypt));

    fs::remove_file(&input).unwrap();
    let container = tmp.path().join("notes.txt.pcv");
    let opened = Pipeline::new(Job::infer(&container, pw("pw")).kdf(cheap_kdf())).run();
    assert_eq!(summary(opened).mode, Some(pcv_core::Mode::Decrypt));
    assert_eq!(fs::read(&input).unwrap(), data);
}

#[test]
fn states_are_reported_in_order() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", b"abc");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = |seen: &Arc<Mutex<Vec<RunState>>>| -> StateFn {
        let seen = Arc::clone(seen);
        Box::new(move |s| seen.lock().unwrap().push(s))
    };

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let container = job.resolved_output();
    Pipeline::new(job).on_state(recorder(&seen)).run();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            RunState::Init,
            RunState::DeriveKey,
            RunState::StreamChunks,
            RunState::Finalize,
            RunState::Done
        ]
    );

    seen.lock().unwrap().clear();
    let job = Job::decrypt(&container, pw("pw"))
        .output(tmp.path().join("out"))
        .kdf(cheap_kdf());
    Pipeline::new(job).on_state(recorder(&seen)).run();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            RunState::Init,
            RunState::DeriveKey,
            RunState::VerifyPassword,
            RunState::StreamChunks,
            RunState::Finalize,
            RunState::Done
        ]
    );
}

#[test]
fn progress_is_monotonic_and_reaches_one() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(3 * MIB - 5));

    let seen = Arc::new(Mutex::new(Vec::<Progress>::new()));
    let progress: ProgressFn = {
        let seen = Arc::clone(&seen);
        Box::new(move |p| seen.lock().unwrap().push(p.clone()))
    };
    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    summary(Pipeline::new(job).with_progress(progress).run());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|w| w[0].fraction <= w[1].fraction));
    assert_eq!(seen.last().map(|p| p.fraction), Some(1.0));
    assert!(seen.iter().all(|p| p.status().starts_with("Working at ")));
}

#[test]
fn cancel_before_start_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(1000));

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let output = job.resolved_output();
    let pipeline = Pipeline::new(job);
    pipeline.cancel_token().cancel();

    assert_eq!(pipeline.run(), Outcome::Cancelled);
    assert!(!output.exists());
}

#[test]
fn cancel_mid_stream_removes_partial_output() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(3 * MIB));

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let output = job.resolved_output();
    let pipeline = Pipeline::new(job);
    let token = pipeline.cancel_token();
    let progress: ProgressFn = Box::new(move |_| token.cancel());

    let outcome = pipeline.with_progress(progress).run();
    assert_eq!(outcome, Outcome::Cancelled);
    assert!(!output.exists(), "cancelled runs must remove their output");
}

#[test]
fn spawned_pipeline_joins_with_outcome() {
    let tmp = TempDir::new().unwrap();
    let data = make_data(70_000);
    let input = write_input(tmp.path(), "plain.bin", &data);

    let handle = Pipeline::new(Job::encrypt(&input, pw("pw")).kdf(cheap_kdf()))
        .spawn()
        .unwrap();
    let done = summary(handle.join());
    assert_eq!(done.bytes, data.len() as u64);
}

#[test]
fn panicking_worker_is_internal_failure() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path(), "plain.bin", &make_data(3 * MIB));

    let job = Job::encrypt(&input, pw("pw")).kdf(cheap_kdf());
    let output = job.resolved_output();
    let progress: ProgressFn = Box::new(|_| panic!("front end exploded"));
    let handle = Pipeline::new(job).with_progress(progress).spawn().unwrap();

    assert_eq!(handle.join().failure_kind(), Some(ErrorKind::Internal));
    assert!(!output.exists(), "a panicked run must not leave a partial container");
}

#[test]
fn missing_input_is_invalid() {
    let tmp = TempDir::new().unwrap();
    let outcome = Pipeline::new(Job::encrypt(tmp.path().join("absent"), pw("pw"))).run();
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::InvalidInput));
}
