//! Hiding fragment envelopes in images
//!
//! The orchestrator only depends on the [`Steganographer`] trait. The bundled
//! implementation writes one payload bit into the least significant bit of
//! each red, green and blue channel (alpha is left untouched), most
//! significant payload bit first. The payload is framed with a 4-byte
//! big-endian length. Output is always PNG, since any lossy re-encoding
//! destroys the hidden bits.

use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use image::{ImageError, ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes of the length prefix in front of every hidden payload
const LENGTH_PREFIX_LEN: usize = 4;

/// Color channels used per pixel (R, G, B)
const CHANNELS_PER_PIXEL: usize = 3;

pub trait Steganographer {
    /// Hide `payload` in the image at `carrier` and write the result to `output`.
    fn embed(&self, carrier: &Path, payload: &[u8], output: &Path) -> Result<PathBuf>;

    /// Recover the payload hidden in the image at `stego`.
    fn extract(&self, stego: &Path) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LsbSteganographer;

impl LsbSteganographer {
    pub fn new() -> Self {
        Self
    }
}

impl Steganographer for LsbSteganographer {
    fn embed(&self, carrier: &Path, payload: &[u8], output: &Path) -> Result<PathBuf> {
        let mut img = image::open(carrier)
            .map_err(|e| image_error(e, format!("failed to open carrier {}", carrier.display())))?
            .to_rgba8();

        embed_in(&mut img, payload)?;

        img.save_with_format(output, ImageFormat::Png)
            .map_err(|e| image_error(e, format!("failed to write {}", output.display())))?;
        debug!(
            carrier = %carrier.display(),
            output = %output.display(),
            bytes = payload.len(),
            "payload embedded"
        );

        Ok(output.to_path_buf())
    }

    fn extract(&self, stego: &Path) -> Result<Vec<u8>> {
        let img = image::open(stego)
            .map_err(|e| image_error(e, format!("failed to open image {}", stego.display())))?
            .to_rgba8();

        extract_from(&img).map_err(|e| e.with_context(format!("no payload in {}", stego.display())))
    }
}

/// Number of payload bytes (excluding the length prefix) an image can hold.
pub fn capacity(img: &RgbaImage) -> usize {
    let bits = img.width() as usize * img.height() as usize * CHANNELS_PER_PIXEL;
    (bits / 8).saturating_sub(LENGTH_PREFIX_LEN)
}

pub fn embed_in(img: &mut RgbaImage, payload: &[u8]) -> Result<()> {
    let available = capacity(img);
    if payload.len() > available {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::Steganography,
            format!(
                "carrier too small: payload is {} bytes, image holds {}",
                payload.len(),
                available
            ),
        ));
    }
    let len = u32::try_from(payload.len()).map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Steganography,
            "payload too large to frame",
            e,
        )
    })?;

    let bits = len
        .to_be_bytes()
        .into_iter()
        .chain(payload.iter().copied())
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1));

    for (channel, bit) in color_channels_mut(img).zip(bits) {
        *channel = (*channel & 0xFE) | bit;
    }
    Ok(())
}

pub fn extract_from(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = color_channels(img)
        .collect::<Vec<u8>>()
        .chunks_exact(8)
        .map(|bits| bits.iter().fold(0u8, |acc, bit| (acc << 1) | (bit & 1)))
        .collect::<Vec<u8>>();

    if bytes.len() < LENGTH_PREFIX_LEN {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::Steganography,
            "image too small to hold a payload",
        ));
    }

    let prefix: [u8; LENGTH_PREFIX_LEN] = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let len = u32::from_be_bytes(prefix) as usize;
    if len > bytes.len() - LENGTH_PREFIX_LEN {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::Steganography,
            format!(
                "declared payload length {} exceeds image capacity {}",
                len,
                bytes.len() - LENGTH_PREFIX_LEN
            ),
        ));
    }

    bytes.truncate(LENGTH_PREFIX_LEN + len);
    bytes.drain(..LENGTH_PREFIX_LEN);
    Ok(bytes)
}

fn color_channels(img: &RgbaImage) -> impl Iterator<Item = u8> + '_ {
    img.iter()
        .enumerate()
        .filter(|(i, _)| i % 4 < CHANNELS_PER_PIXEL)
        .map(|(_, channel)| *channel)
}

fn color_channels_mut(img: &mut RgbaImage) -> impl Iterator<Item = &mut u8> + '_ {
    img.iter_mut()
        .enumerate()
        .filter(|(i, _)| i % 4 < CHANNELS_PER_PIXEL)
        .map(|(_, channel)| channel)
}

fn image_error(err: ImageError, msg: String) -> FracturedKeyError {
    match err {
        ImageError::IoError(io) => {
            FracturedKeyError::with_kind_and_source(ErrorCategory::User, ErrorKind::Io, msg, io)
        }
        other => FracturedKeyError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Steganography,
            msg,
            other,
        ),
    }
}
