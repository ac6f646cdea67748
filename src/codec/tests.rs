//! Tests for [`MessageCodec`] and the single-frame helpers.

use bytes::BytesMut;
use proptest::{
    collection::{btree_map, vec},
    prelude::*,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use rstest::rstest;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio_util::codec::{Decoder, Encoder};

use super::*;

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    TestRunner::new_with_rng(config, TestRng::deterministic_rng(RngAlgorithm::ChaCha))
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
        "\\PC{0,8}".prop_map(Value::from),
    ]
}

fn message_strategy() -> impl Strategy<Value = Message> {
    (
        "[a-z_]{1,16}",
        btree_map("[a-z_]{1,10}", json_leaf(), 0..6),
    )
        .prop_map(|(kind, fields)| {
            fields
                .into_iter()
                .fold(Message::new(kind), |message, (key, value)| {
                    message.with_field(key, value)
                })
        })
}

fn frame(declared: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_slice(&write_network_u32(declared));
    buf.put_slice(payload);
    buf
}

fn codec_error(err: io::Error) -> CodecError { CodecError::from_io(err) }

#[test]
fn generated_message_sequences_round_trip() {
    let mut runner = deterministic_runner(128);
    runner
        .run(&vec(message_strategy(), 1..8), |messages| {
            let mut codec = MessageCodec::default();
            let mut wire = BytesMut::new();
            for message in &messages {
                codec
                    .encode(message.clone(), &mut wire)
                    .map_err(|err| TestCaseError::fail(format!("encode failed: {err}")))?;
            }
            for expected in &messages {
                let decoded = codec
                    .decode(&mut wire)
                    .map_err(|err| TestCaseError::fail(format!("decode failed: {err}")))?
                    .ok_or_else(|| TestCaseError::fail("missing frame".to_owned()))?;
                prop_assert_eq!(&decoded, expected);
            }
            prop_assert!(wire.is_empty());
            Ok(())
        })
        .expect("encoded messages should decode to equal messages");
}

#[test]
fn truncated_frames_never_yield_a_message() {
    let mut runner = deterministic_runner(128);
    let strategy = (1_usize..512).prop_flat_map(|declared| (Just(declared), 0..declared));
    runner
        .run(&strategy, |(declared, available)| {
            let declared_u32 = u32::try_from(declared).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let mut codec = MessageCodec::default();
            let mut wire = frame(declared_u32, &vec![b'x'; available]);

            prop_assert!(codec.decode(&mut wire).map_err(|e| TestCaseError::fail(e.to_string()))?.is_none());
            match codec.decode_eof(&mut wire).map_err(codec_error) {
                Err(CodecError::IncompleteFrame {
                    bytes_received,
                    expected,
                }) => {
                    prop_assert_eq!(bytes_received, available);
                    prop_assert_eq!(expected, declared);
                }
                other => return Err(TestCaseError::fail(format!("unexpected result: {other:?}"))),
            }
            Ok(())
        })
        .expect("truncated payloads should report IncompleteFrame");
}

#[test]
fn frame_split_across_reads_decodes_once_complete() {
    let message = Message::new("echo").with_field("content", "split me");
    let wire = encode(&message, DEFAULT_MAX_FRAME_LENGTH).expect("encode");
    let mut codec = MessageCodec::default();
    let mut buf = BytesMut::new();

    let (last, rest) = wire.split_last().expect("non-empty frame");
    for byte in rest {
        buf.put_u8(*byte);
        assert!(codec.decode(&mut buf).expect("partial decode").is_none());
    }
    buf.put_u8(*last);
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(message));
    assert!(buf.is_empty());
}

#[test]
fn header_uses_big_endian_payload_length() {
    let message = Message::new("ping");
    let wire = encode(&message, DEFAULT_MAX_FRAME_LENGTH).expect("encode");
    let payload = message.to_vec().expect("serialize");
    let header: [u8; 4] = wire[..LENGTH_HEADER_SIZE].try_into().expect("header");
    assert_eq!(read_network_u32(header) as usize, payload.len());
    assert_eq!(&wire[LENGTH_HEADER_SIZE..], payload.as_slice());
}

#[rstest]
#[case::empty(&[], None)]
#[case::mid_header(&[0, 0], Some((2, LENGTH_HEADER_SIZE)))]
#[case::header_only(&[0, 0, 0, 9], Some((0, 9)))]
fn decode_eof_distinguishes_clean_close(
    #[case] input: &[u8],
    #[case] incomplete: Option<(usize, usize)>,
) {
    let mut codec = MessageCodec::default();
    let mut buf = BytesMut::from(input);
    let result = codec.decode_eof(&mut buf).map_err(codec_error);
    match (result, incomplete) {
        (Ok(None), None) => {}
        (
            Err(CodecError::IncompleteFrame {
                bytes_received,
                expected,
            }),
            Some((want_received, want_expected)),
        ) => {
            assert_eq!(bytes_received, want_received);
            assert_eq!(expected, want_expected);
        }
        (other, _) => panic!("unexpected decode_eof result: {other:?}"),
    }
}

#[test]
fn oversized_declared_length_is_rejected_before_buffering() {
    let mut codec = MessageCodec::new(MIN_FRAME_LENGTH);
    let mut buf = frame(u32::MAX, b"");
    let err = codec.decode(&mut buf).map_err(codec_error).expect_err("must reject");
    assert!(matches!(
        err,
        CodecError::FrameTooLarge { size, max } if size == u32::MAX as usize && max == MIN_FRAME_LENGTH
    ));
}

#[rstest]
#[case::not_json(b"not json".as_slice())]
#[case::array(br#"["ping"]"#.as_slice())]
#[case::missing_type(br#"{"content":"x"}"#.as_slice())]
#[case::empty_payload(b"".as_slice())]
fn malformed_payloads_are_reported(#[case] payload: &[u8]) {
    let mut codec = MessageCodec::default();
    let declared = u32::try_from(payload.len()).expect("small payload");
    let mut buf = frame(declared, payload);
    let err = codec.decode(&mut buf).map_err(codec_error).expect_err("must fail");
    assert!(matches!(err, CodecError::MalformedPayload(_)), "got {err:?}");
}

#[test]
fn decoder_recovers_frame_boundary_after_malformed_payload() {
    let mut codec = MessageCodec::default();
    let mut buf = frame(3, b"bad");
    let good = encode(&Message::new("ping"), DEFAULT_MAX_FRAME_LENGTH).expect("encode");
    buf.put_slice(&good);

    assert!(codec.decode(&mut buf).is_err());
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some(Message::new("ping")));
}

#[test]
fn encoder_rejects_payloads_over_limit() {
    let message = Message::new("echo").with_field("content", "x".repeat(MIN_FRAME_LENGTH));
    let err = encode(&message, MIN_FRAME_LENGTH).expect_err("must reject");
    assert!(matches!(err, CodecError::FrameTooLarge { max, .. } if max == MIN_FRAME_LENGTH));
}

#[rstest]
#[case(0, MIN_FRAME_LENGTH)]
#[case(1024, 1024)]
#[case(usize::MAX, MAX_FRAME_LENGTH)]
fn max_frame_length_is_clamped(#[case] requested: usize, #[case] expected: usize) {
    assert_eq!(MessageCodec::new(requested).max_frame_length(), expected);
}

#[tokio::test]
async fn read_message_consumes_exactly_one_frame() {
    let (mut client, mut server) = duplex(1024);
    let first = Message::new("ping").with_field("n", 1);
    let second = Message::new("ping").with_field("n", 2);

    write_message(&mut client, &first, DEFAULT_MAX_FRAME_LENGTH)
        .await
        .expect("write first");
    write_message(&mut client, &second, DEFAULT_MAX_FRAME_LENGTH)
        .await
        .expect("write second");
    client.write_all(b"tail").await.expect("write tail");
    drop(client);

    assert_eq!(
        read_message(&mut server, DEFAULT_MAX_FRAME_LENGTH).await.expect("first"),
        first
    );
    assert_eq!(
        read_message(&mut server, DEFAULT_MAX_FRAME_LENGTH).await.expect("second"),
        second
    );
    let mut tail = Vec::new();
    server.read_to_end(&mut tail).await.expect("read tail");
    assert_eq!(tail, b"tail");
}

#[tokio::test]
async fn read_message_reports_truncation() {
    let (mut client, mut server) = duplex(64);
    client.write_all(&write_network_u32(10)).await.expect("header");
    client.write_all(b"abc").await.expect("partial payload");
    drop(client);

    let err = read_message(&mut server, DEFAULT_MAX_FRAME_LENGTH)
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        CodecError::IncompleteFrame {
            bytes_received: 3,
            expected: 10
        }
    ));
}

#[tokio::test]
async fn read_message_on_immediate_eof_reports_empty_header() {
    let (client, mut server) = duplex(64);
    drop(client);

    let err = read_message(&mut server, DEFAULT_MAX_FRAME_LENGTH)
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        CodecError::IncompleteFrame {
            bytes_received: 0,
            expected: LENGTH_HEADER_SIZE
        }
    ));
}
