//! Flat-buffer decoding for batched verbs.
//!
//! A request delivers one contiguous byte region whose layout is fixed per
//! verb. Size arrays travel as little-endian `u64` values:
//!
//! - `exists`:          `[ksizes | keys | flag bit-field]`
//! - `length`:          `[ksizes | keys | vsizes]`
//! - `put`:             `[ksizes | vsizes | keys | vals]`
//! - `get`:             `[ksizes | keys | vsizes | vals]`
//! - `erase`:           `[ksizes | keys]`
//! - `list_keys`:       `[ksizes | keys]` (result area only)
//! - `list_key_values`: `[ksizes | vsizes | keys | vals]` (result area only)
//!
//! The decoder performs every structural check of the contract — no
//! zero-sized input key, counts consistent, the region large enough for the
//! declared layout — and returns `InvalidArgs` before the backend is
//! called. Results are encoded back into the same region, ready to be
//! pushed to the client by the transport.

use bytes::Bytes;
use common::sentinel::KEY_NOT_FOUND;
use common::{BitField, ByteRun, Error, Mode, Result, ValueSink};
use database::Database;

const SIZE_WIDTH: usize = std::mem::size_of::<u64>();

/// Splits a `count`-entry size array off the front of `buf`.
fn split_sizes(buf: &mut [u8], count: usize) -> Result<(Vec<usize>, &mut [u8])> {
    let header = count
        .checked_mul(SIZE_WIDTH)
        .ok_or_else(|| Error::invalid_args("size header overflows"))?;
    if buf.len() < header {
        return Err(Error::invalid_args("region too small for size header"));
    }
    let (head, rest) = buf.split_at_mut(header);
    let mut sizes = Vec::with_capacity(count);
    for chunk in head.chunks_exact(SIZE_WIDTH) {
        let size = u64::from_le_bytes(chunk.try_into().expect("exact chunk"));
        sizes.push(
            usize::try_from(size)
                .map_err(|_| Error::invalid_args("element size exceeds address space"))?,
        );
    }
    Ok((sizes, rest))
}

/// Reads a `count`-entry size array in place without consuming it.
fn read_size_area(area: &[u8], count: usize) -> Vec<u64> {
    area.chunks_exact(SIZE_WIDTH)
        .take(count)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("exact chunk")))
        .collect()
}

/// Writes a size array back into its region, little-endian.
fn write_size_area(area: &mut [u8], sizes: &[u64]) {
    for (chunk, size) in area.chunks_exact_mut(SIZE_WIDTH).zip(sizes) {
        chunk.copy_from_slice(&size.to_le_bytes());
    }
}

fn reject_empty_keys(ksizes: &[usize]) -> Result<()> {
    if ksizes.iter().any(|&size| size == 0) {
        return Err(Error::invalid_args("zero-sized key"));
    }
    Ok(())
}

fn checked_total(sizes: &[usize]) -> Result<usize> {
    sizes
        .iter()
        .try_fold(0usize, |total, &size| total.checked_add(size))
        .ok_or_else(|| Error::invalid_args("element sizes overflow"))
}

pub(crate) async fn exists(
    db: &dyn Database,
    mode: Mode,
    count: usize,
    buf: &mut [u8],
) -> Result<()> {
    let (ksizes, rest) = split_sizes(buf, count)?;
    reject_empty_keys(&ksizes)?;
    let total_ksize = checked_total(&ksizes)?;
    let flags_size = BitField::bytes_needed(count);
    if rest.len() < total_ksize.checked_add(flags_size).unwrap_or(usize::MAX) {
        return Err(Error::invalid_args("region too small for flag field"));
    }
    let (keys_region, flags_region) = rest.split_at_mut(total_ksize);
    let keys = ByteRun::new(keys_region, &ksizes)?;
    let mut flags = BitField::new(flags_region, count)?;
    db.exists(mode, &keys, &mut flags).await
}

pub(crate) async fn length(
    db: &dyn Database,
    mode: Mode,
    count: usize,
    buf: &mut [u8],
) -> Result<()> {
    let (ksizes, rest) = split_sizes(buf, count)?;
    reject_empty_keys(&ksizes)?;
    let total_ksize = checked_total(&ksizes)?;
    if rest.len() < total_ksize.checked_add(count * SIZE_WIDTH).unwrap_or(usize::MAX) {
        return Err(Error::invalid_args("region too small for size results"));
    }
    let (keys_region, vsizes_region) = rest.split_at_mut(total_ksize);
    let keys = ByteRun::new(keys_region, &ksizes)?;
    let mut vsizes = vec![0u64; count];
    db.length(mode, &keys, &mut vsizes).await?;
    write_size_area(vsizes_region, &vsizes);
    Ok(())
}

pub(crate) async fn put(
    db: &dyn Database,
    mode: Mode,
    count: usize,
    buf: &mut [u8],
) -> Result<()> {
    let (ksizes, rest) = split_sizes(buf, count)?;
    let (vsizes, rest) = split_sizes(rest, count)?;
    reject_empty_keys(&ksizes)?;
    let total_ksize = checked_total(&ksizes)?;
    let total_vsize = checked_total(&vsizes)?;
    if rest.len() < total_ksize.checked_add(total_vsize).unwrap_or(usize::MAX) {
        return Err(Error::invalid_args("region too small for keys and values"));
    }
    let (keys_region, vals_region) = rest.split_at(total_ksize);
    let keys = ByteRun::new(keys_region, &ksizes)?;
    let vals = ByteRun::new(&vals_region[..total_vsize], &vsizes)?;
    db.put(mode, &keys, &vals).await
}

pub(crate) async fn get(
    db: &dyn Database,
    mode: Mode,
    count: usize,
    packed: bool,
    buf: &mut [u8],
) -> Result<()> {
    let (ksizes, rest) = split_sizes(buf, count)?;
    reject_empty_keys(&ksizes)?;
    let total_ksize = checked_total(&ksizes)?;
    if rest.len() < total_ksize.checked_add(count * SIZE_WIDTH).unwrap_or(usize::MAX) {
        return Err(Error::invalid_args("region too small for value results"));
    }
    let (keys_region, out) = rest.split_at_mut(total_ksize);
    let (vsizes_region, vals_region) = out.split_at_mut(count * SIZE_WIDTH);
    let keys = ByteRun::new(keys_region, &ksizes)?;
    let mut vsizes = read_size_area(vsizes_region, count);
    {
        let mut sink = if packed {
            ValueSink::packed(vals_region, &mut vsizes)
        } else {
            ValueSink::unpacked(vals_region, &mut vsizes)?
        };
        db.get(mode, &keys, &mut sink).await?;
    }
    write_size_area(vsizes_region, &vsizes);
    Ok(())
}

pub(crate) async fn erase(
    db: &dyn Database,
    mode: Mode,
    count: usize,
    buf: &mut [u8],
) -> Result<()> {
    let (ksizes, rest) = split_sizes(buf, count)?;
    reject_empty_keys(&ksizes)?;
    let keys = ByteRun::new(rest, &ksizes)?;
    db.erase(mode, &keys).await
}

pub(crate) async fn list_keys(
    db: &dyn Database,
    mode: Mode,
    max: usize,
    packed: bool,
    from_key: &[u8],
    filter: &[u8],
    buf: &mut [u8],
) -> Result<()> {
    let header = max
        .checked_mul(SIZE_WIDTH)
        .ok_or_else(|| Error::invalid_args("size header overflows"))?;
    if buf.len() < header {
        return Err(Error::invalid_args("region too small for size header"));
    }
    let (ksizes_region, keys_region) = buf.split_at_mut(header);
    let mut ksizes = read_size_area(ksizes_region, max);
    let filter = common::new_filter(mode, Bytes::copy_from_slice(filter))?;
    {
        let mut sink = if packed {
            ValueSink::packed(keys_region, &mut ksizes)
        } else {
            ValueSink::unpacked(keys_region, &mut ksizes)?
        };
        db.list_keys(mode, from_key, filter.as_ref(), &mut sink).await?;
    }
    write_size_area(ksizes_region, &ksizes);
    Ok(())
}

/// `key_buf_size` fixes the split between the key and value byte regions;
/// in unpacked layout it must cover the key slot capacities.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn list_key_values(
    db: &dyn Database,
    mode: Mode,
    max: usize,
    packed: bool,
    from_key: &[u8],
    filter: &[u8],
    key_buf_size: usize,
    buf: &mut [u8],
) -> Result<()> {
    let half = max
        .checked_mul(SIZE_WIDTH)
        .ok_or_else(|| Error::invalid_args("size header overflows"))?;
    let header = half
        .checked_mul(2)
        .ok_or_else(|| Error::invalid_args("size header overflows"))?;
    if buf.len() < header || buf.len() - header < key_buf_size {
        return Err(Error::invalid_args("region too small for listing layout"));
    }
    let (ksizes_region, rest) = buf.split_at_mut(half);
    let (vsizes_region, rest) = rest.split_at_mut(half);
    let (keys_region, vals_region) = rest.split_at_mut(key_buf_size);
    let mut ksizes = read_size_area(ksizes_region, max);
    let mut vsizes = read_size_area(vsizes_region, max);
    let filter = common::new_filter(mode, Bytes::copy_from_slice(filter))?;
    {
        let (mut keys_out, mut vals_out) = if packed {
            (
                ValueSink::packed(keys_region, &mut ksizes),
                ValueSink::packed(vals_region, &mut vsizes),
            )
        } else {
            (
                ValueSink::unpacked(keys_region, &mut ksizes)?,
                ValueSink::unpacked(vals_region, &mut vsizes)?,
            )
        };
        db.list_key_values(mode, from_key, filter.as_ref(), &mut keys_out, &mut vals_out)
            .await?;
    }
    write_size_area(ksizes_region, &ksizes);
    write_size_area(vsizes_region, &vsizes);
    Ok(())
}

/// Direct variant of `exists`: takes already-split key slices.
pub(crate) async fn exists_direct(
    db: &dyn Database,
    mode: Mode,
    keys: &[&[u8]],
) -> Result<Vec<bool>> {
    if keys.iter().any(|key| key.is_empty()) {
        return Err(Error::invalid_args("zero-sized key"));
    }
    let (data, sizes) = concat(keys);
    let run = ByteRun::new(&data, &sizes)?;
    let mut region = vec![0u8; BitField::bytes_needed(keys.len())];
    let mut flags = BitField::new(&mut region, keys.len())?;
    db.exists(mode, &run, &mut flags).await?;
    Ok((0..keys.len()).map(|i| flags.get(i)).collect())
}

/// Direct variant of `length`: takes already-split key slices. Missing keys
/// report [`KEY_NOT_FOUND`] in their slot.
pub(crate) async fn length_direct(
    db: &dyn Database,
    mode: Mode,
    keys: &[&[u8]],
) -> Result<Vec<u64>> {
    if keys.iter().any(|key| key.is_empty()) {
        return Err(Error::invalid_args("zero-sized key"));
    }
    let (data, sizes) = concat(keys);
    let run = ByteRun::new(&data, &sizes)?;
    let mut vsizes = vec![KEY_NOT_FOUND; keys.len()];
    db.length(mode, &run, &mut vsizes).await?;
    Ok(vsizes)
}

fn concat(keys: &[&[u8]]) -> (Vec<u8>, Vec<usize>) {
    let mut data = Vec::with_capacity(keys.iter().map(|key| key.len()).sum());
    let mut sizes = Vec::with_capacity(keys.len());
    for key in keys {
        data.extend_from_slice(key);
        sizes.push(key.len());
    }
    (data, sizes)
}
