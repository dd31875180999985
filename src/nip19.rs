//! NIP-19: bech32-encoded entities
//!
//! encoding and decoding of `nsec`, `npub`, `nprofile`, `note`, `nevent` and `naddr`.

use crate::{pointers::*, Kind, PubKey, SecretKey, ID};
use bech32::{self, FromBase32, ToBase32, Variant};
use thiserror::Error;

const TLV_DEFAULT: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Nip19Error {
    #[error("invalid bech32 encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported identifier type '{0}'")]
    UnsupportedIdentifierType(String),

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("{0} should be 32 bytes, got {1}")]
    InvalidLength(&'static str, usize),

    #[error("invalid uint32 value for kind")]
    InvalidKind,

    #[error("missing required {0} entry")]
    MissingField(&'static str),

    #[error("TLV value too long ({0} bytes)")]
    TlvTooLong(usize),
}

impl From<bech32::Error> for Nip19Error {
    fn from(err: bech32::Error) -> Self {
        Nip19Error::InvalidEncoding(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Nip19Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Nip19Error::InvalidEncoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Nip19Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    SecretKey(SecretKey),
    PubKey(PubKey),
    Profile(ProfilePointer),
    Event(EventPointer),
    Address(AddressPointer),
}

impl DecodeResult {
    /// the bech32 prefix this result was decoded from
    pub fn prefix(&self) -> &'static str {
        match self {
            DecodeResult::SecretKey(_) => "nsec",
            DecodeResult::PubKey(_) => "npub",
            DecodeResult::Profile(_) => "nprofile",
            DecodeResult::Event(p) if p.relays.is_empty() && p.author.is_none() && p.kind.is_none() => {
                "note"
            }
            DecodeResult::Event(_) => "nevent",
            DecodeResult::Address(_) => "naddr",
        }
    }
}

fn fixed32(field: &'static str, data: &[u8]) -> Result<[u8; 32]> {
    data.try_into()
        .map_err(|_| Nip19Error::InvalidLength(field, data.len()))
}

fn pubkey32(field: &'static str, data: &[u8]) -> Result<PubKey> {
    PubKey::from_bytes(fixed32(field, data)?).map_err(|_| Nip19Error::InvalidPublicKey)
}

fn kind32(data: &[u8]) -> Result<Kind> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| Nip19Error::InvalidKind)?;
    let kind = u32::from_be_bytes(bytes);
    u16::try_from(kind)
        .map(Kind)
        .map_err(|_| Nip19Error::InvalidKind)
}

/// decode any bech32-encoded NIP-19 string
pub fn decode(bech32_string: &str) -> Result<DecodeResult> {
    let (prefix, data, _variant) = bech32::decode(bech32_string.trim())?;
    let data = Vec::<u8>::from_base32(&data)?;

    match prefix.as_str() {
        "nsec" => {
            let bytes = fixed32("nsec", &data)?;
            let sk = SecretKey::from_bytes(bytes).map_err(|_| Nip19Error::InvalidSecretKey)?;
            Ok(DecodeResult::SecretKey(sk))
        }
        "npub" => Ok(DecodeResult::PubKey(pubkey32("npub", &data)?)),
        "note" => Ok(DecodeResult::Event(EventPointer {
            id: ID::from_bytes(fixed32("note", &data)?),
            relays: Vec::new(),
            author: None,
            kind: None,
        })),
        "nprofile" => {
            let mut public_key = None;
            let mut relays = Vec::new();

            for (typ, value) in TlvReader::new(&data) {
                match typ {
                    TLV_DEFAULT => public_key = Some(pubkey32("pubkey", value)?),
                    TLV_RELAY => relays.push(String::from_utf8(value.to_vec())?),
                    _ => {}
                }
            }

            Ok(DecodeResult::Profile(ProfilePointer {
                public_key: public_key.ok_or(Nip19Error::MissingField("pubkey"))?,
                relays,
            }))
        }
        "nevent" => {
            let mut id = None;
            let mut result = EventPointer {
                id: ID::from_bytes([0u8; 32]),
                relays: Vec::new(),
                author: None,
                kind: None,
            };

            for (typ, value) in TlvReader::new(&data) {
                match typ {
                    TLV_DEFAULT => id = Some(ID::from_bytes(fixed32("id", value)?)),
                    TLV_RELAY => result.relays.push(String::from_utf8(value.to_vec())?),
                    TLV_AUTHOR => result.author = Some(pubkey32("author", value)?),
                    TLV_KIND => result.kind = Some(kind32(value)?),
                    _ => {}
                }
            }

            result.id = id.ok_or(Nip19Error::MissingField("id"))?;
            Ok(DecodeResult::Event(result))
        }
        "naddr" => {
            let mut identifier = None;
            let mut public_key = None;
            let mut kind = None;
            let mut relays = Vec::new();

            for (typ, value) in TlvReader::new(&data) {
                match typ {
                    TLV_DEFAULT => identifier = Some(String::from_utf8(value.to_vec())?),
                    TLV_RELAY => relays.push(String::from_utf8(value.to_vec())?),
                    TLV_AUTHOR => public_key = Some(pubkey32("author", value)?),
                    TLV_KIND => kind = Some(kind32(value)?),
                    _ => {}
                }
            }

            Ok(DecodeResult::Address(AddressPointer {
                identifier: identifier.ok_or(Nip19Error::MissingField("identifier"))?,
                public_key: public_key.ok_or(Nip19Error::MissingField("author"))?,
                kind: kind.ok_or(Nip19Error::MissingField("kind"))?,
                relays,
            }))
        }
        _ => Err(Nip19Error::UnsupportedIdentifierType(prefix)),
    }
}

/// decode an `nsec`, anything else is an encoding error
pub fn decode_secret(encoded: &str) -> Result<SecretKey> {
    match decode(encoded) {
        Ok(DecodeResult::SecretKey(sk)) => Ok(sk),
        Ok(other) => Err(Nip19Error::InvalidEncoding(format!(
            "expected nsec, got {}",
            other.prefix()
        ))),
        Err(Nip19Error::UnsupportedIdentifierType(prefix)) => Err(Nip19Error::InvalidEncoding(
            format!("expected nsec, got {}", prefix),
        )),
        Err(err) => Err(err),
    }
}

/// decode an `npub`, `nprofile` or `naddr`; every other type is unsupported
pub fn decode_public_or_address(encoded: &str) -> Result<Pointer> {
    match decode(encoded)? {
        DecodeResult::PubKey(public_key) => Ok(Pointer::Profile(ProfilePointer {
            public_key,
            relays: Vec::new(),
        })),
        DecodeResult::Profile(p) => Ok(Pointer::Profile(p)),
        DecodeResult::Address(p) => Ok(Pointer::Address(p)),
        other => Err(Nip19Error::UnsupportedIdentifierType(
            other.prefix().to_string(),
        )),
    }
}

/// convert any pointer-like bech32 string to a pointer
pub fn to_pointer(code: &str) -> Result<Pointer> {
    match decode(code)? {
        DecodeResult::Event(p) => Ok(Pointer::Event(p)),
        DecodeResult::SecretKey(_) => Err(Nip19Error::UnsupportedIdentifierType("nsec".into())),
        _ => decode_public_or_address(code),
    }
}

/// encode a secret key as nsec
pub fn encode_nsec(sk: &SecretKey) -> Result<String> {
    let bits5 = sk.to_bytes().to_base32();
    Ok(bech32::encode("nsec", bits5, Variant::Bech32)?)
}

/// encode a public key as npub
pub fn encode_npub(pk: &PubKey) -> Result<String> {
    let bits5 = pk.as_bytes().to_base32();
    Ok(bech32::encode("npub", bits5, Variant::Bech32)?)
}

/// encode an event id as note
pub fn encode_note(id: &ID) -> Result<String> {
    let bits5 = id.as_bytes().to_base32();
    Ok(bech32::encode("note", bits5, Variant::Bech32)?)
}

/// encode a profile pointer as nprofile
pub fn encode_nprofile(pk: &PubKey, relays: &[String]) -> Result<String> {
    let mut buf = Vec::new();
    write_tlv_entry(&mut buf, TLV_DEFAULT, pk.as_bytes())?;

    for relay in relays {
        write_tlv_entry(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }

    let bits5 = buf.to_base32();
    Ok(bech32::encode("nprofile", bits5, Variant::Bech32)?)
}

/// encode an event pointer as nevent
pub fn encode_nevent(pointer: &EventPointer) -> Result<String> {
    let mut buf = Vec::new();
    write_tlv_entry(&mut buf, TLV_DEFAULT, pointer.id.as_bytes())?;

    for relay in &pointer.relays {
        write_tlv_entry(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }

    if let Some(author) = &pointer.author {
        write_tlv_entry(&mut buf, TLV_AUTHOR, author.as_bytes())?;
    }

    if let Some(kind) = pointer.kind {
        write_tlv_entry(&mut buf, TLV_KIND, &(kind.0 as u32).to_be_bytes())?;
    }

    let bits5 = buf.to_base32();
    Ok(bech32::encode("nevent", bits5, Variant::Bech32)?)
}

/// encode an address pointer as naddr
pub fn encode_naddr(pointer: &AddressPointer) -> Result<String> {
    let mut buf = Vec::new();

    write_tlv_entry(&mut buf, TLV_DEFAULT, pointer.identifier.as_bytes())?;

    for relay in &pointer.relays {
        write_tlv_entry(&mut buf, TLV_RELAY, relay.as_bytes())?;
    }

    write_tlv_entry(&mut buf, TLV_AUTHOR, pointer.public_key.as_bytes())?;
    write_tlv_entry(&mut buf, TLV_KIND, &(pointer.kind.0 as u32).to_be_bytes())?;

    let bits5 = buf.to_base32();
    Ok(bech32::encode("naddr", bits5, Variant::Bech32)?)
}

/// encode a pointer using the appropriate encoding
pub fn encode_pointer(pointer: &Pointer) -> Result<String> {
    match pointer {
        Pointer::Profile(p) if p.relays.is_empty() => encode_npub(&p.public_key),
        Pointer::Profile(p) => encode_nprofile(&p.public_key, &p.relays),
        Pointer::Event(p) => encode_nevent(p),
        Pointer::Address(p) => encode_naddr(p),
    }
}

/// iterates over `type, length, value` entries, stopping at the first truncated one
struct TlvReader<'a> {
    data: &'a [u8],
}

impl<'a> TlvReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }

        let typ = self.data[0];
        let length = self.data[1] as usize;
        if self.data.len() < 2 + length {
            return None;
        }

        let value = &self.data[2..2 + length];
        self.data = &self.data[2 + length..];
        Some((typ, value))
    }
}

/// write a TLV entry to buffer
fn write_tlv_entry(buf: &mut Vec<u8>, typ: u8, value: &[u8]) -> Result<()> {
    let length = value.len();
    if length > 255 {
        return Err(Nip19Error::TlvTooLong(length));
    }

    buf.push(typ);
    buf.push(length as u8);
    buf.extend_from_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pubkey() -> PubKey {
        PubKey::from_hex("d91191e30e00444b942c0e82cad470b32af171764c2275bee0bd99377efd4075")
            .unwrap()
    }

    #[test]
    fn test_encode_decode_npub() {
        let pk = test_pubkey();
        let npub = encode_npub(&pk).unwrap();
        assert_eq!(
            npub,
            "npub1mygerccwqpzyh9pvp6pv44rskv40zutkfs38t0hqhkvnwlhagp6s3psn5p"
        );

        assert_eq!(decode(&npub).unwrap(), DecodeResult::PubKey(pk));
        assert_eq!(
            decode_public_or_address(&npub).unwrap(),
            Pointer::Profile(ProfilePointer {
                public_key: pk,
                relays: vec![]
            })
        );
    }

    #[test]
    fn test_encode_decode_nsec() {
        let sk_hex = "fe20f3381b9404e9a35afb49b3dc070a4dc1ffd321ab8f3eae979ab96f601e3a";
        let sk = SecretKey::from_hex(sk_hex).unwrap();
        let nsec = encode_nsec(&sk).unwrap();
        assert_eq!(
            nsec,
            "nsec1lcs0xwqmjszwng66ldym8hq8pfxurl7nyx4c704wj7dtjmmqrcaqazp4dg"
        );

        assert_eq!(decode_secret(&nsec).unwrap(), sk);
        assert_eq!(decode_secret(&format!("  {}\n", nsec)).unwrap(), sk);
    }

    #[test]
    fn test_encode_decode_nprofile() {
        let pk = test_pubkey();
        let relays = vec![
            "wss://relay.primal.net".to_string(),
            "wss://nostr.land".to_string(),
        ];

        let nprofile = encode_nprofile(&pk, &relays).unwrap();
        assert_eq!(nprofile, "nprofile1qqsdjyv3uv8qq3ztjskqaqk263ctx2h3w9mycgn4hmstmxfh0m75qagpzemhxue69uhhyetvv9ujuurjd9kkzmpwdejhgqgswaehxw309ahx7um5wghxcctwvs3a0whv");

        match decode_public_or_address(&nprofile).unwrap() {
            Pointer::Profile(profile) => {
                assert_eq!(profile.public_key, pk);
                assert_eq!(profile.relays, relays);
            }
            other => panic!("expected profile, got {:?}", other),
        }
    }

    #[test]
    fn test_naddr_round_trip() {
        let pointer = AddressPointer {
            public_key: test_pubkey(),
            kind: Kind::GROUP_METADATA,
            identifier: "pizza-lovers".to_string(),
            relays: vec!["wss://groups.example.com".to_string()],
        };

        let naddr = encode_naddr(&pointer).unwrap();
        assert!(naddr.starts_with("naddr1"));
        assert_eq!(
            decode_public_or_address(&naddr).unwrap(),
            Pointer::Address(pointer.clone())
        );
        assert_eq!(encode_pointer(&Pointer::Address(pointer)).unwrap(), naddr);
    }

    #[test]
    fn test_nevent_and_note() {
        let id = ID::from_hex("7ad1758b4a75dd6a5d0b6a96870afc63375c3e8f9b38885aabd049450b2588f9")
            .unwrap();
        let note = encode_note(&id).unwrap();
        assert_eq!(
            to_pointer(&note).unwrap(),
            Pointer::Event(EventPointer {
                id,
                relays: vec![],
                author: None,
                kind: None
            })
        );

        let pointer = EventPointer {
            id,
            relays: vec!["wss://nos.lol".to_string()],
            author: Some(test_pubkey()),
            kind: Some(Kind::GROUP_CHAT_MESSAGE),
        };
        let nevent = encode_nevent(&pointer).unwrap();
        assert_eq!(decode(&nevent).unwrap(), DecodeResult::Event(pointer));

        // not something a profile/group lookup accepts
        assert_eq!(
            decode_public_or_address(&nevent).unwrap_err(),
            Nip19Error::UnsupportedIdentifierType("nevent".into())
        );
        assert_eq!(
            decode_public_or_address(&note).unwrap_err(),
            Nip19Error::UnsupportedIdentifierType("note".into())
        );
    }

    #[test]
    fn test_decode_failures() {
        let npub = encode_npub(&test_pubkey()).unwrap();

        // wrong prefix for a secret
        assert!(matches!(
            decode_secret(&npub),
            Err(Nip19Error::InvalidEncoding(_))
        ));

        // broken checksum
        let mut broken = npub.clone();
        broken.pop();
        broken.push(if npub.ends_with('q') { 'p' } else { 'q' });
        assert!(matches!(decode(&broken), Err(Nip19Error::InvalidEncoding(_))));
        assert!(matches!(
            decode_secret("not bech32 at all"),
            Err(Nip19Error::InvalidEncoding(_))
        ));

        // unknown prefix with a valid checksum
        let other = bech32::encode("nfoo", [1u8; 32].to_base32(), Variant::Bech32).unwrap();
        assert_eq!(
            decode(&other).unwrap_err(),
            Nip19Error::UnsupportedIdentifierType("nfoo".into())
        );
        assert!(matches!(
            decode_secret(&other),
            Err(Nip19Error::InvalidEncoding(_))
        ));

        // nprofile without the pubkey entry
        let mut buf = Vec::new();
        write_tlv_entry(&mut buf, TLV_RELAY, b"wss://x.com").unwrap();
        let empty = bech32::encode("nprofile", buf.to_base32(), Variant::Bech32).unwrap();
        assert_eq!(
            decode(&empty).unwrap_err(),
            Nip19Error::MissingField("pubkey")
        );

        let long = "x".repeat(300);
        assert_eq!(
            write_tlv_entry(&mut Vec::new(), TLV_RELAY, long.as_bytes()).unwrap_err(),
            Nip19Error::TlvTooLong(300)
        );
    }
}
