use pinsx_core::{ProviderError, SlotCodec, StateCodec, StateVector};

#[test]
fn encode_prepends_a_cleared_construction_flag() {
    let codec = SlotCodec::new(2);
    let vector = codec.encode(&vec![1, 0]).expect("encode");
    assert_eq!(vector.as_slice(), &[0, 1, 0]);
    assert_eq!(vector.len(), codec.state_length());
    assert!(!vector.is_construction());
    assert_eq!(vector.payload(), &[1, 0]);
}

#[test]
fn decode_accepts_encoded_vectors() {
    let codec = SlotCodec::new(3);
    let vector = codec.encode(&vec![-4, 7, i32::MAX]).expect("encode");
    let payload = codec.decode(vector.as_slice()).expect("decode");
    assert_eq!(payload, &[-4, 7, i32::MAX]);
}

#[test]
fn decode_rejects_wrong_length() {
    let codec = SlotCodec::new(2);
    for slots in [&[0][..], &[0, 1][..], &[0, 1, 2, 3][..]] {
        let err = codec.decode(slots).expect_err("wrong length");
        assert!(matches!(err, ProviderError::MalformedState(_)), "{err:?}");
    }
}

#[test]
fn decode_rejects_construction_vector() {
    let codec = SlotCodec::new(2);
    let construction = StateVector::construction(&[0, 0]);
    assert!(construction.is_construction());
    assert_eq!(construction.as_slice(), &[1, 0, 0]);
    let err = codec.decode(construction.as_slice()).expect_err("construction");
    assert!(matches!(err, ProviderError::MalformedState(_)));
}

#[test]
fn encode_rejects_payload_of_wrong_size() {
    let codec = SlotCodec::new(2);
    let err = codec.encode(&vec![1]).expect_err("short payload");
    assert!(matches!(err, ProviderError::MalformedState(_)));
}

#[test]
fn state_vector_serializes_as_plain_array() {
    let vector = StateVector::from_slots(vec![0, 3, 4]);
    let json = serde_json::to_string(&vector).expect("serialize");
    assert_eq!(json, "[0,3,4]");
}
