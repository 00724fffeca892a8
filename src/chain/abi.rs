//! Minimal Solidity ABI codec for the fixed contract schema.
//!
//! Only the types the mint contract uses are supported: `address`,
//! `uint256` (held as `u128`), `bool`, `string`, `address[]` and `bool[]`.

use crate::{error::WalletError, types::Address};

const WORD: usize = 32;

/// A single ABI-encodable argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    String(String),
    AddressArray(Vec<Address>),
    BoolArray(Vec<bool>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(
            self,
            Token::String(_) | Token::AddressArray(_) | Token::BoolArray(_)
        )
    }

    fn static_word(&self) -> [u8; 32] {
        match self {
            Token::Address(a) => address_word(a),
            Token::Uint(v) => uint_word(*v),
            Token::Bool(b) => uint_word(u128::from(*b)),
            _ => [0u8; 32],
        }
    }

    fn tail(&self) -> Vec<u8> {
        match self {
            Token::String(s) => {
                let bytes = s.as_bytes();
                let mut out = uint_word(bytes.len() as u128).to_vec();
                out.extend_from_slice(bytes);
                out.resize(WORD + padded_len(bytes.len()), 0);
                out
            }
            Token::AddressArray(items) => {
                let mut out = uint_word(items.len() as u128).to_vec();
                for a in items {
                    out.extend_from_slice(&address_word(a));
                }
                out
            }
            Token::BoolArray(items) => {
                let mut out = uint_word(items.len() as u128).to_vec();
                for b in items {
                    out.extend_from_slice(&uint_word(u128::from(*b)));
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

/// Head/tail encode a list of arguments.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend(token.tail());
        } else {
            head.extend_from_slice(&token.static_word());
        }
    }

    head.extend(tail);
    head
}

/// Calldata for `signature` called with `tokens`.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut keccak = Keccak::v256();
    keccak.update(data);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Topic 0 of an event with the given canonical signature.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// The `index`-th 32-byte word of `data`.
pub fn word(data: &[u8], index: usize) -> Result<[u8; 32], WalletError> {
    let start = index.checked_mul(WORD).ok_or_else(|| out_of_range(index))?;
    word_at(data, start)
}

fn word_at(data: &[u8], start: usize) -> Result<[u8; 32], WalletError> {
    let end = start.checked_add(WORD).ok_or_else(|| out_of_range(start))?;
    let slice = data.get(start..end).ok_or_else(|| {
        WalletError::MalformedResponse(format!(
            "ABI data too short: need {} bytes, have {}",
            end,
            data.len()
        ))
    })?;
    let mut out = [0u8; 32];
    out.copy_from_slice(slice);
    Ok(out)
}

pub fn decode_uint(word: &[u8; 32]) -> Result<u128, WalletError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(WalletError::MalformedResponse(
            "uint256 value exceeds 128 bits".to_string(),
        ));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(buf))
}

pub fn decode_u64(word: &[u8; 32]) -> Result<u64, WalletError> {
    let value = decode_uint(word)?;
    u64::try_from(value)
        .map_err(|_| WalletError::MalformedResponse(format!("value {value} exceeds u64")))
}

pub fn decode_address(word: &[u8; 32]) -> Address {
    Address::from_word(word)
}

pub fn decode_bool(word: &[u8; 32]) -> bool {
    word.iter().any(|b| *b != 0)
}

/// Decode a `string` whose offset is stored in head word `index`.
pub fn decode_string(data: &[u8], index: usize) -> Result<String, WalletError> {
    let offset = offset_at(data, index)?;
    let len = usize_from(&word_at(data, offset)?)?;
    let start = offset.checked_add(WORD).ok_or_else(|| out_of_range(offset))?;
    let end = start.checked_add(len).ok_or_else(|| out_of_range(len))?;
    let bytes = data.get(start..end).ok_or_else(|| {
        WalletError::MalformedResponse("string payload truncated".to_string())
    })?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| WalletError::MalformedResponse(format!("string is not UTF-8: {e}")))
}

/// Decode a `uint256[]` whose offset is stored in head word `index`.
pub fn decode_uint_array(data: &[u8], index: usize) -> Result<Vec<u128>, WalletError> {
    let offset = offset_at(data, index)?;
    let len = usize_from(&word_at(data, offset)?)?;
    (1..=len)
        .map(|i| {
            let at = i
                .checked_mul(WORD)
                .and_then(|n| n.checked_add(offset))
                .ok_or_else(|| out_of_range(offset))?;
            decode_uint(&word_at(data, at)?)
        })
        .collect()
}

/// Recover the message from an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (sel, body) = data.split_at_checked(4)?;
    if sel != selector("Error(string)") {
        return None;
    }
    decode_string(body, 0).ok().filter(|s| !s.is_empty())
}

fn out_of_range(value: usize) -> WalletError {
    WalletError::MalformedResponse(format!("ABI offset {value} out of range"))
}

fn offset_at(data: &[u8], index: usize) -> Result<usize, WalletError> {
    usize_from(&word(data, index)?)
}

fn usize_from(word: &[u8; 32]) -> Result<usize, WalletError> {
    let value = decode_uint(word)?;
    usize::try_from(value)
        .map_err(|_| WalletError::MalformedResponse(format!("length {value} out of range")))
}

fn address_word(a: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(&a.0);
    out
}

fn uint_word(v: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[16..].copy_from_slice(&v.to_be_bytes());
    out
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(hex::encode(selector("owner()")), "8da5cb5b");
        assert_eq!(hex::encode(selector("Error(string)")), "08c379a0");
        assert_eq!(hex::encode(selector("mint()")), "1249c58b");
    }

    #[test]
    fn transfer_single_topic() {
        assert_eq!(
            hex::encode(event_topic(
                "TransferSingle(address,address,address,uint256,uint256)"
            )),
            "c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62"
        );
    }

    #[test]
    fn encode_static_args() {
        let addr: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let out = encode(&[Token::Address(addr), Token::Uint(10_000)]);
        assert_eq!(out.len(), 64);
        assert_eq!(out[31], 0xaa);
        assert_eq!(&out[62..], &[0x27, 0x10]);
    }

    #[test]
    fn encode_string_uses_offset_and_padding() {
        let out = encode(&[Token::String("ipfs://cid/".into())]);
        // offset word + length word + one padded data word
        assert_eq!(out.len(), 96);
        assert_eq!(decode_uint(&word(&out, 0).unwrap()).unwrap(), 32);
        assert_eq!(decode_uint(&word(&out, 1).unwrap()).unwrap(), 11);
        assert_eq!(decode_string(&out, 0).unwrap(), "ipfs://cid/");
    }

    #[test]
    fn encode_two_dynamic_arrays() {
        let a: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let b: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();
        let out = encode(&[
            Token::AddressArray(vec![a, b]),
            Token::BoolArray(vec![true, false]),
        ]);
        // head: 2 offsets; tails: (len + 2) words each
        assert_eq!(out.len(), 32 * 2 + 32 * 3 * 2);
        assert_eq!(decode_uint(&word(&out, 0).unwrap()).unwrap(), 64);
        assert_eq!(decode_uint(&word(&out, 1).unwrap()).unwrap(), 160);
        assert_eq!(decode_address(&word(&out, 3).unwrap()), a);
        assert!(decode_bool(&word(&out, 6).unwrap()));
        assert!(!decode_bool(&word(&out, 7).unwrap()));
    }

    #[test]
    fn decode_uint_array_roundtrip_layout() {
        let mut data = uint_word(32).to_vec();
        data.extend(uint_word(3));
        data.extend(uint_word(3));
        data.extend(uint_word(1));
        data.extend(uint_word(2));
        assert_eq!(decode_uint_array(&data, 0).unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn decode_rejects_short_data() {
        assert!(word(&[0u8; 16], 0).is_err());
        assert!(decode_string(&uint_word(32), 0).is_err());
    }

    #[test]
    fn huge_offsets_and_lengths_are_errors() {
        let mut max_offset = [0u8; 32];
        max_offset[24..].fill(0xff);
        assert!(decode_string(&max_offset, 0).is_err());
        assert!(decode_uint_array(&max_offset, 0).is_err());

        // Valid offset, length word near usize::MAX.
        let mut data = uint_word(32).to_vec();
        data.extend(max_offset);
        assert!(decode_string(&data, 0).is_err());
        assert!(decode_uint_array(&data, 0).is_err());

        assert!(word(&data, usize::MAX).is_err());
    }

    #[test]
    fn decode_uint_rejects_overflow() {
        let mut w = [0u8; 32];
        w[0] = 1;
        assert!(decode_uint(&w).is_err());
    }

    #[test]
    fn revert_reason_requires_error_selector() {
        let mut payload = selector("Error(string)").to_vec();
        payload.extend(encode(&[Token::String("Sold out".into())]));
        assert_eq!(decode_revert_reason(&payload).as_deref(), Some("Sold out"));

        payload[0] ^= 0xff;
        assert_eq!(decode_revert_reason(&payload), None);
        assert_eq!(decode_revert_reason(&[0x08]), None);
    }
}
