// Copyright (c) 2024 Botho Foundation

//! Cursor buffer for encoding and decoding onion layers.

use rand::RngCore;
use std::{ops::Range, time::Duration};
use veil_crypto_secp256k1::{
    Cipher, Cloak, Hash, Iv, PrivateKey, PublicKey, Signature, CIPHER_LEN, CLOAK_LEN, HASH_LEN,
    IV_LEN, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN,
};

use super::{AddrPort, Id, Magic, WireError, ADDR_LEN, BYTES_PREFIX_LEN, ID_LEN, MAGIC_LEN};

/// A byte buffer with a single cursor.
///
/// Encoders size the buffer up front from the layer lengths. Writing past
/// the end is an encoder bug: debug builds panic on it, release builds grow
/// the buffer so the message stays well-formed.
/// Reads never run past the end: they fail with [`WireError::TooShort`]
/// naming the layer currently being decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct Splice {
    buf: Vec<u8>,
    cursor: usize,
    context: Magic,
}

impl Splice {
    /// Allocate a zeroed buffer of exactly `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len],
            cursor: 0,
            context: Magic::UNKNOWN,
        }
    }

    /// Wrap received bytes for decoding, cursor at 0.
    pub fn load(bytes: Vec<u8>) -> Self {
        Self {
            buf: bytes,
            cursor: 0,
            context: Magic::UNKNOWN,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the buffer length.
    pub fn set_cursor(&mut self, pos: usize) {
        self.cursor = pos.min(self.buf.len());
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Bytes from the cursor to the end.
    pub fn rest(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Bytes in `[start, end)`, clamped to the buffer.
    pub fn range(&self, start: usize, end: usize) -> &[u8] {
        let end = end.min(self.buf.len());
        &self.buf[start.min(end)..end]
    }

    pub fn range_mut(&mut self, start: usize, end: usize) -> &mut [u8] {
        let end = end.min(self.buf.len());
        &mut self.buf[start.min(end)..end]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// The layer tag reported by short reads.
    pub fn context(&self) -> Magic {
        self.context
    }

    pub fn set_context(&mut self, magic: Magic) {
        self.context = magic;
    }

    /// Fail unless at least `needed` bytes remain after the cursor.
    pub fn require(&self, magic: Magic, needed: usize) -> Result<(), WireError> {
        if self.remaining() < needed {
            return Err(WireError::TooShort {
                magic,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// The tag at the cursor, without consuming it.
    pub fn peek_magic(&self) -> Option<Magic> {
        self.rest().get(..MAGIC_LEN).and_then(Magic::from_slice)
    }

    /// XOR the keystream of (`cipher`, `iv`) over `[start, end)`.
    ///
    /// Applying the same call twice restores the original bytes.
    pub fn encrypt_range(&mut self, cipher: &Cipher, iv: &Iv, start: usize, end: usize) {
        cipher.apply(iv, self.range_mut(start, end));
    }

    /// Copy `src` to `dest` inside the buffer. Regions may overlap.
    pub fn copy_within(&mut self, src: Range<usize>, dest: usize) {
        debug_assert!(dest + src.len() <= self.buf.len());
        self.buf.copy_within(src, dest);
    }

    /// Overwrite `[start, end)` with random bytes.
    pub fn fill_noise(&mut self, start: usize, end: usize) {
        rand::thread_rng().fill_bytes(self.range_mut(start, end));
    }

    fn reserve(&mut self, n: usize) -> &mut [u8] {
        let start = self.cursor;
        let end = start + n;
        debug_assert!(end <= self.buf.len(), "write past precomputed length");
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.cursor = end;
        &mut self.buf[start..end]
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.reserve(bytes.len()).copy_from_slice(bytes);
        self
    }

    pub fn write_magic(&mut self, magic: Magic) -> &mut Self {
        self.write_raw(magic.as_bytes())
    }

    pub fn write_id(&mut self, id: Id) -> &mut Self {
        self.write_raw(&id.0.to_le_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_balance(&mut self, value: i64) -> &mut Self {
        self.write_raw(&value.to_le_bytes())
    }

    /// Durations are nanoseconds, saturating at `u64::MAX`.
    pub fn write_duration(&mut self, value: Duration) -> &mut Self {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        self.write_u64(nanos)
    }

    pub fn write_addr(&mut self, addr: &AddrPort) -> &mut Self {
        self.write_raw(&addr.to_bytes())
    }

    pub fn write_pub_key(&mut self, key: &PublicKey) -> &mut Self {
        self.write_raw(&key.to_bytes())
    }

    pub fn write_priv_key(&mut self, key: &PrivateKey) -> &mut Self {
        let bytes = key.to_bytes();
        self.write_raw(&bytes[..])
    }

    pub fn write_cloak(&mut self, cloak: &Cloak) -> &mut Self {
        self.write_raw(cloak.as_bytes())
    }

    pub fn write_iv(&mut self, iv: &Iv) -> &mut Self {
        self.write_raw(iv.as_bytes())
    }

    pub fn write_hash(&mut self, hash: &Hash) -> &mut Self {
        self.write_raw(hash.as_bytes())
    }

    pub fn write_cipher(&mut self, cipher: &Cipher) -> &mut Self {
        self.write_raw(cipher.as_bytes())
    }

    pub fn write_ciphers(&mut self, ciphers: &[Cipher; 3]) -> &mut Self {
        for cipher in ciphers {
            self.write_cipher(cipher);
        }
        self
    }

    pub fn write_nonces(&mut self, nonces: &[Iv; 3]) -> &mut Self {
        for iv in nonces {
            self.write_iv(iv);
        }
        self
    }

    pub fn write_signature(&mut self, signature: &Signature) -> &mut Self {
        self.write_raw(signature.as_bytes())
    }

    /// Length-prefixed (u32 LE) byte payload.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        debug_assert!(bytes.len() <= u32::MAX as usize);
        self.write_raw(&(bytes.len() as u32).to_le_bytes());
        self.write_raw(bytes)
    }

    fn take(&mut self, n: usize) -> Result<&[u8], WireError> {
        self.require(self.context, n)?;
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.buf[start..start + n])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, WireError> {
        self.take(n).map(<[u8]>::to_vec)
    }

    pub fn read_magic(&mut self) -> Result<Magic, WireError> {
        self.take_array::<MAGIC_LEN>().map(Magic)
    }

    pub fn read_id(&mut self) -> Result<Id, WireError> {
        self.take_array::<ID_LEN>().map(|b| Id(u64::from_le_bytes(b)))
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        self.take_array::<2>().map(u16::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.take_array::<8>().map(u64::from_le_bytes)
    }

    pub fn read_balance(&mut self) -> Result<i64, WireError> {
        self.take_array::<8>().map(i64::from_le_bytes)
    }

    pub fn read_duration(&mut self) -> Result<Duration, WireError> {
        self.read_u64().map(Duration::from_nanos)
    }

    pub fn read_addr(&mut self) -> Result<AddrPort, WireError> {
        let bytes = self.take_array::<ADDR_LEN>()?;
        AddrPort::from_bytes(&bytes)
    }

    pub fn read_pub_key(&mut self) -> Result<PublicKey, WireError> {
        let bytes = self.take_array::<PUBLIC_KEY_LEN>()?;
        Ok(PublicKey::from_bytes(&bytes)?)
    }

    pub fn read_priv_key(&mut self) -> Result<PrivateKey, WireError> {
        let bytes = zeroize::Zeroizing::new(self.take_array::<PRIVATE_KEY_LEN>()?);
        Ok(PrivateKey::from_bytes(&bytes)?)
    }

    pub fn read_cloak(&mut self) -> Result<Cloak, WireError> {
        self.take_array::<CLOAK_LEN>().map(Cloak::from_bytes)
    }

    pub fn read_iv(&mut self) -> Result<Iv, WireError> {
        self.take_array::<IV_LEN>().map(Iv::from_bytes)
    }

    pub fn read_hash(&mut self) -> Result<Hash, WireError> {
        self.take_array::<HASH_LEN>().map(Hash::from_bytes)
    }

    pub fn read_cipher(&mut self) -> Result<Cipher, WireError> {
        let bytes = self.take(CIPHER_LEN)?;
        Ok(Cipher::from_bytes(bytes)?)
    }

    pub fn read_ciphers(&mut self) -> Result<[Cipher; 3], WireError> {
        Ok([self.read_cipher()?, self.read_cipher()?, self.read_cipher()?])
    }

    pub fn read_nonces(&mut self) -> Result<[Iv; 3], WireError> {
        Ok([self.read_iv()?, self.read_iv()?, self.read_iv()?])
    }

    pub fn read_signature(&mut self) -> Result<Signature, WireError> {
        let bytes = self.take(SIGNATURE_LEN)?;
        Ok(Signature::from_bytes(bytes)?)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = u32::from_le_bytes(self.take_array::<BYTES_PREFIX_LEN>()?) as usize;
        self.read_raw(len)
    }
}

impl std::fmt::Debug for Splice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splice")
            .field("len", &self.buf.len())
            .field("cursor", &self.cursor)
            .field("context", &self.context)
            .finish()
    }
}
