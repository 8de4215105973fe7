use proptest::prelude::*;
use wallet_vault::{
    address_of, decrypt_from_storage, encrypt_for_storage, is_valid_address, sign, ExportCodec,
    KeyPair, WalletConfig,
};

fn private_key() -> impl Strategy<Value = String> {
    // any non-zero scalar below the curve order; leading byte keeps it well below n
    (0x01u8..0xfe, prop::array::uniform31(any::<u8>())).prop_map(|(head, tail)| {
        let mut bytes = vec![head];
        bytes.extend_from_slice(&tail);
        hex::encode(bytes)
    })
}

fn codec() -> ExportCodec {
    ExportCodec::new(&WalletConfig::with_secret("property-secret").export)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn storage_roundtrips(key in private_key(), password in ".{1,40}") {
        let blob = encrypt_for_storage(&key, &password).unwrap();
        let plain = decrypt_from_storage(&password, &blob.cipher_text, &blob.iv, &blob.auth_tag);
        prop_assert_eq!(plain, Some(key));
    }

    #[test]
    fn storage_rejects_other_passwords(
        key in private_key(),
        password in "[a-z]{1,20}",
        other in "[A-Z0-9]{1,20}",
    ) {
        let blob = encrypt_for_storage(&key, &password).unwrap();
        let plain = decrypt_from_storage(&other, &blob.cipher_text, &blob.iv, &blob.auth_tag);
        prop_assert_eq!(plain, None);
    }

    #[test]
    fn export_roundtrips(key in private_key()) {
        let codec = codec();
        let envelope = codec.export_for_backup(&key).unwrap();
        prop_assert_eq!(codec.import_from_backup(&envelope), Some(key));
    }

    #[test]
    fn export_rejects_any_flipped_ciphertext_byte(key in private_key(), pos in any::<prop::sample::Index>()) {
        let codec = codec();
        let envelope = codec.export_for_backup(&key).unwrap();
        let (body, mac) = envelope.rsplit_once(":::").unwrap();
        let mut bytes = hex::decode(body).unwrap();
        let idx = pos.index(bytes.len());
        bytes[idx] ^= 0x01;
        let tampered = format!("{}:::{}", hex::encode(bytes), mac);
        prop_assert_eq!(codec.import_from_backup(&tampered), None);
    }

    #[test]
    fn derived_addresses_validate(key in private_key()) {
        let pair = KeyPair::from_private_hex(&key).unwrap();
        let address = address_of(pair.public_key()).unwrap();
        prop_assert_eq!(address.len(), 34);
        prop_assert!(is_valid_address(&address));
    }

    #[test]
    fn non_key_input_has_no_address(text in "[g-z ]{1,64}") {
        prop_assert!(address_of(&text).is_err());
    }
}

#[test]
fn concrete_storage_scenario() {
    let pair = KeyPair::generate().unwrap();
    let address = address_of(pair.public_key()).unwrap();
    assert_eq!(address.len(), 34);
    assert!(address
        .chars()
        .all(|c| "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz".contains(c)));

    let blob = encrypt_for_storage(pair.private_key(), "CorrectHorse1!").unwrap();
    assert_eq!(
        decrypt_from_storage("CorrectHorse1!", &blob.cipher_text, &blob.iv, &blob.auth_tag)
            .as_deref(),
        Some(pair.private_key())
    );
    assert_eq!(
        decrypt_from_storage("wrong", &blob.cipher_text, &blob.iv, &blob.auth_tag),
        None
    );
}

#[test]
fn concrete_signature_scenario() {
    let pair = KeyPair::generate().unwrap();
    let payload = serde_json::json!({
        "nonce": "n1",
        "publickey": pair.public_key(),
        "timestamp": 1_700_000_000u64,
        "address": pair.address(),
    });
    let sig = sign(pair.private_key(), &payload).unwrap();
    assert_eq!(sig.len(), 128);
}

#[test]
fn concrete_export_corruption_scenario() {
    let codec = codec();
    let pair = KeyPair::generate().unwrap();
    let envelope = codec.export_for_backup(pair.private_key()).unwrap();

    // the envelope body ends with the ciphertext
    let (body, mac) = envelope.rsplit_once(":::").unwrap();
    let mut chars: Vec<char> = body.chars().collect();
    let i = chars.len() - 3;
    chars[i] = if chars[i] == 'a' { 'b' } else { 'a' };
    let corrupted = format!("{}:::{}", chars.into_iter().collect::<String>(), mac);
    assert_eq!(codec.import_from_backup(&corrupted), None);
}
