use bytes::Bytes;
use kinesis_tail::aggregate::{deaggregate, Deaggregated, KPL_MAGIC};
use pretty_assertions::assert_eq;

mod common;

use common::kpl_record;

#[test]
fn test_sub_records_come_back_in_order() {
    let raw = kpl_record(
        &["pk-a", "pk-b"],
        &[(0, b"one".as_slice()), (1, b"two".as_slice()), (0, b"three".as_slice())],
    );

    let records: Vec<Bytes> = deaggregate(Bytes::from(raw)).into_iter().collect();
    assert_eq!(
        records,
        vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two"),
            Bytes::from_static(b"three"),
        ]
    );
}

#[test]
fn test_corrupt_digest_falls_back_to_single() {
    let mut raw = kpl_record(&["pk"], &[(0, b"payload".as_slice())]);
    let last = raw.len() - 1;
    raw[last] ^= 0xff;

    let payload = Bytes::from(raw);
    assert_eq!(deaggregate(payload.clone()), Deaggregated::Single(payload));
}

#[test]
fn test_magic_alone_is_a_plain_record() {
    let payload = Bytes::copy_from_slice(&KPL_MAGIC);
    let result = deaggregate(payload.clone());
    assert_eq!(result.len(), 1);
    assert_eq!(result, Deaggregated::Single(payload));
}

#[test]
fn test_empty_container_yields_no_records() {
    let raw = kpl_record(&["pk"], &[]);
    let result = deaggregate(Bytes::from(raw));
    assert!(result.is_empty());
    assert_eq!(result.into_iter().count(), 0);
}

#[test]
fn test_binary_payloads_survive() {
    let blob: Vec<u8> = (0..=255).collect();
    let raw = kpl_record(&["pk"], &[(0, blob.as_slice()), (0, b"".as_slice())]);

    let records: Vec<Bytes> = deaggregate(Bytes::from(raw)).into_iter().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].as_ref(), blob.as_slice());
    assert!(records[1].is_empty());
}
