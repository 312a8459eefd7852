/*!
 * 编解码测试模块
 *
 * Round trips through files, streams and both body encodings, plus the
 * decoder's handling of corrupt and foreign input.
 */

use std::io::Cursor;
use tempfile::TempDir;

use optstore::result::{Objective, ObjectiveCallable, ParamValue, CALLABLE_KEY};
use optstore::storage::format::{ArtifactHeader, BodyEncoding, HEADER_LEN};
use optstore::storage::{
    decode, dump, encode, load, DecodeError, DecodeStage, Destination, PersistenceOptions,
    ResultDecoder, ResultEncoder, Source,
};

use crate::test_utils::*;

/// 场景测试：fun = -0.1749, 15 evaluations, callable kept, no compression
#[test]
fn test_scenario_keep_then_drop_callable() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("forest.optr");
    let result = scenario_result();
    assert_eq!(result.n_evaluations(), SCENARIO_CALLS);

    dump(&result, &path, &PersistenceOptions::default()).unwrap();
    let restored = load(&path).unwrap();
    assert_eq!(restored.fun, SCENARIO_FUN);
    assert!(restored.specs.args.contains_key(CALLABLE_KEY));

    dump(&result, &path, &PersistenceOptions::without_callable()).unwrap();
    let restored = load(&path).unwrap();
    assert_eq!(restored.fun, SCENARIO_FUN);
    assert!(!restored.specs.args.contains_key(CALLABLE_KEY));
}

#[test]
fn test_empty_callable_survives_round_trip() {
    let result = scenario_result_with(ObjectiveCallable::Absent);
    let decoder = ResultDecoder::default();

    for level in [0, 9] {
        let bytes = ResultEncoder::new(PersistenceOptions::compressed(level))
            .unwrap()
            .encode_to_vec(&result)
            .unwrap();
        let restored = decoder.decode_slice(&bytes).unwrap();

        // 键存在但值为空，与排除后的缺失键不同
        assert!(restored.specs.has_callable_key(), "level {}", level);
        assert_eq!(
            restored.specs.callable(),
            Some(&ObjectiveCallable::Absent),
            "level {}",
            level
        );
        assert_eq!(restored, result, "level {}", level);
    }

    let excluded = ResultEncoder::new(PersistenceOptions::without_callable())
        .unwrap()
        .encode_to_vec(&result)
        .unwrap();
    let restored = decoder.decode_slice(&excluded).unwrap();
    assert!(!restored.specs.has_callable_key());
    assert_eq!(restored.specs.callable(), None);
}

#[test]
fn test_round_trip_is_structurally_equal() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("round_trip.optr");
    let result = scenario_result();

    dump(&result, &path, &PersistenceOptions::default()).unwrap();
    let restored = load(&path).unwrap();

    assert_eq!(restored, result);
    assert_eq!(restored.space.n_dims(), 3);
    assert_eq!(restored.specs.function, "forest_minimize");
}

#[test]
fn test_round_trip_preserves_objective_behavior() {
    let result = scenario_result();
    let encoder = ResultEncoder::new(PersistenceOptions::default()).unwrap();
    let bytes = encoder.encode_to_vec(&result).unwrap();
    let restored = ResultDecoder::default().decode_slice(&bytes).unwrap();

    let Some(ObjectiveCallable::Opaque(opaque)) = restored.specs.callable() else {
        panic!("decoded result should carry an opaque objective");
    };
    let objective = objective_registry().resolve(opaque).unwrap();

    let probe = [
        ParamValue::Real(1.5),
        ParamValue::Integer(3),
        ParamValue::from("rbf"),
    ];
    assert_eq!(objective.evaluate(&probe), scenario_objective().evaluate(&probe));
}

#[test]
fn test_compression_levels_decode_identically() {
    let result = scenario_result();

    let raw = ResultEncoder::new(PersistenceOptions::compressed(0))
        .unwrap()
        .encode_to_vec(&result)
        .unwrap();
    let packed = ResultEncoder::new(PersistenceOptions::compressed(9))
        .unwrap()
        .encode_to_vec(&result)
        .unwrap();

    println!("raw artifact: {} bytes", raw.len());
    println!("compressed artifact: {} bytes", packed.len());

    assert_ne!(raw, packed);
    assert!(packed.len() <= raw.len());

    let single = single_evaluation_result();
    let single_raw = ResultEncoder::new(PersistenceOptions::compressed(0))
        .unwrap()
        .encode_to_vec(&single)
        .unwrap();
    let single_packed = ResultEncoder::new(PersistenceOptions::compressed(9))
        .unwrap()
        .encode_to_vec(&single)
        .unwrap();
    assert_eq!(single.n_evaluations(), 1);
    assert!(
        single_packed.len() <= single_raw.len(),
        "one evaluation: {} compressed vs {} raw",
        single_packed.len(),
        single_raw.len()
    );

    let decoder = ResultDecoder::default();
    assert_eq!(
        decoder.decode_slice(&raw).unwrap(),
        decoder.decode_slice(&packed).unwrap()
    );
}

#[test]
fn test_every_level_round_trips() {
    let result = scenario_result();
    let decoder = ResultDecoder::default();

    for level in 0..=9 {
        let bytes = ResultEncoder::new(PersistenceOptions::compressed(level))
            .unwrap()
            .encode_to_vec(&result)
            .unwrap();
        let expected = if level == 0 {
            BodyEncoding::Raw
        } else {
            BodyEncoding::Gzip
        };
        assert_eq!(bytes[5], expected.as_byte(), "level {}", level);
        assert_eq!(decoder.decode_slice(&bytes).unwrap(), result, "level {}", level);
    }
}

#[test]
fn test_decoder_ignores_file_name() {
    let temp_dir = TempDir::new().unwrap();
    // Compressed content under a name that suggests otherwise.
    let path = temp_dir.path().join("plain.msgpack");

    dump(&scenario_result(), &path, &PersistenceOptions::compressed(5)).unwrap();
    let report = ResultDecoder::default()
        .decode_with_report(Source::from(&path))
        .unwrap();

    assert_eq!(report.header.encoding, BodyEncoding::Gzip);
    assert_eq!(report.header.compression_level, 5);
    assert_eq!(report.result.fun, SCENARIO_FUN);
}

#[test]
fn test_stream_round_trip() {
    let result = scenario_result();
    let mut sink = Vec::new();
    encode(
        &result,
        Destination::writer(&mut sink),
        &PersistenceOptions::compressed(1),
    )
    .unwrap();

    let mut cursor = Cursor::new(sink);
    let restored = decode(Source::reader(&mut cursor)).unwrap();
    assert_eq!(restored, result);
}

#[test]
fn test_decode_reports_trust_boundary() {
    let bytes = ResultEncoder::new(PersistenceOptions::default())
        .unwrap()
        .encode_to_vec(&scenario_result())
        .unwrap();
    let report = ResultDecoder::default()
        .decode_with_report(Source::reader(&mut bytes.as_slice()))
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, "scaled_sphere");
    assert!(report.warnings[0].to_string().contains("specs.args.func"));
}

#[test]
fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = load(temp_dir.path().join("absent.optr")).unwrap_err();
    assert!(matches!(err, DecodeError::Io { .. }));
}

#[test]
fn test_foreign_bytes_are_schema_mismatch() {
    let err = ResultDecoder::default()
        .decode_slice(&[b'{'; HEADER_LEN + 8])
        .unwrap_err();
    assert!(err.is_schema_mismatch(), "got {:?}", err);
}

#[test]
fn test_wrong_shape_body_is_schema_mismatch() {
    #[derive(serde::Serialize)]
    struct SessionState {
        version: u32,
        theme: String,
    }

    let mut body = Vec::new();
    rmp_serde::encode::write_named(
        &mut body,
        &SessionState {
            version: 1,
            theme: "dark".to_string(),
        },
    )
    .unwrap();
    let mut bytes = ArtifactHeader::for_body(BodyEncoding::Raw, 0, &body)
        .to_bytes()
        .to_vec();
    bytes.extend_from_slice(&body);

    let err = ResultDecoder::default().decode_slice(&bytes).unwrap_err();
    assert!(err.is_schema_mismatch(), "got {:?}", err);
}

#[test]
fn test_truncated_msgpack_is_corrupt() {
    let full = ResultEncoder::new(PersistenceOptions::default())
        .unwrap()
        .encode_to_vec(&scenario_result())
        .unwrap();
    // Re-frame a truncated body so the checksum and length agree with it.
    let body = &full[HEADER_LEN..full.len() / 2];
    let mut bytes = ArtifactHeader::for_body(BodyEncoding::Raw, 0, body)
        .to_bytes()
        .to_vec();
    bytes.extend_from_slice(body);

    let err = ResultDecoder::default().decode_slice(&bytes).unwrap_err();
    assert!(
        matches!(
            err,
            DecodeError::CorruptStream {
                stage: DecodeStage::Structure,
                ..
            }
        ),
        "got {:?}",
        err
    );
}

#[test]
fn test_corrupted_artifact_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("damaged.optr");
    dump(&scenario_result(), &path, &PersistenceOptions::compressed(6)).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let middle = HEADER_LEN + (bytes.len() - HEADER_LEN) / 2;
    bytes[middle] ^= 0x5a;
    std::fs::write(&path, &bytes).unwrap();

    assert!(load(&path).unwrap_err().is_corrupt());
}
