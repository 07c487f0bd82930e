//! Whole-buffer digests

use anyhow::Result;
use pixstore::{
    calculate_digest, calculate_hex_digest, ChunkedPixelBuffer, DigestAlgorithm, ImageGeometry,
    PixelBuffer, PixelType, RowMajorPixelBuffer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn random_buffer(dir: &TempDir, name: &str, seed: u64) -> Result<RowMajorPixelBuffer> {
    let geometry = ImageGeometry::new(12, 10, 2, 2, 3, PixelType::UInt16)?;
    let mut buffer = RowMajorPixelBuffer::create(dir.path().join(name), geometry)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<u8> = (0..buffer.total_size()).map(|_| rng.gen()).collect();
    buffer.set_region(data.len(), 0, &data)?;
    Ok(buffer)
}

#[test]
fn test_digest_is_deterministic() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut a = random_buffer(&temp_dir, "a", 11)?;
    let mut b = random_buffer(&temp_dir, "b", 11)?;

    for algorithm in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256] {
        let first = calculate_digest(&mut a, algorithm)?;
        assert_eq!(first.len(), algorithm.output_len());
        assert_eq!(first, calculate_digest(&mut a, algorithm)?);
        assert_eq!(first, calculate_digest(&mut b, algorithm)?);
    }
    Ok(())
}

#[test]
fn test_one_byte_changes_digest() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut buffer = random_buffer(&temp_dir, "a", 5)?;
    let before = calculate_hex_digest(&mut buffer, DigestAlgorithm::Sha1)?;

    let offset = buffer.total_size() - 1;
    let last = buffer.get_region(1, offset)?.expect("native files are addressable");
    buffer.set_region(1, offset, &[last.as_bytes()[0] ^ 0x01])?;

    let after = calculate_hex_digest(&mut buffer, DigestAlgorithm::Sha1)?;
    assert_ne!(before, after);
    assert_eq!(after.len(), 40);
    Ok(())
}

#[test]
fn test_backends_with_same_pixels_agree() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut native = random_buffer(&temp_dir, "a", 23)?;
    let mut chunked = ChunkedPixelBuffer::tuned(temp_dir.path().join("c"), *native.geometry())?;
    for t in 0..native.geometry().size_t {
        let timepoint = native.get_timepoint(t)?;
        chunked.set_timepoint(timepoint.as_bytes(), t)?;
    }

    assert_eq!(
        calculate_digest(&mut native, DigestAlgorithm::Sha256)?,
        calculate_digest(&mut chunked, DigestAlgorithm::Sha256)?
    );
    Ok(())
}
