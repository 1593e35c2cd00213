//! Sparse format definitions and structure checks

use crate::error::{Error, Result};
use crate::sparse::IndexBase;

/// Column index written into (and recognised in) unused ELL slots
///
/// Any index outside `[base, base + n)` is treated as padding when reading.
pub const ELL_PADDING: i32 = -1;

/// Position of slot `slot` of row `row` in ELL storage with `nrows` rows
#[inline]
pub const fn ell_index(row: usize, slot: usize, nrows: usize) -> usize {
    slot * nrows + row
}

/// Returns true if an ELL column index denotes a stored entry
#[inline]
pub fn ell_slot_is_valid(col: i32, base: IndexBase, ncols: usize) -> bool {
    let col = col as i64 - base.offset() as i64;
    col >= 0 && (col as u64) < ncols as u64
}

/// Check the structure of a compressed (CSR or CSC) matrix
///
/// `ptr` holds `major + 1` offsets, `ind` the minor indices. Verifies that
/// `ptr[0] == base`, that offsets never decrease, and that every minor index
/// lies in `[base, base + minor)`. Returns the number of stored entries.
pub fn check_compressed(ptr: &[i32], ind: &[i32], base: IndexBase, minor: usize) -> Result<usize> {
    let b = base.offset();
    let Some((&first, rest)) = ptr.split_first() else {
        return Err(Error::invalid_size("ptr", "pointer array is empty"));
    };
    if first != b {
        return Err(Error::invalid_value(
            "ptr",
            format!("first offset is {first}, expected {b}"),
        ));
    }

    let mut prev = first;
    for (i, &p) in rest.iter().enumerate() {
        if p < prev {
            return Err(Error::invalid_value(
                "ptr",
                format!("offset {} decreases from {prev} to {p}", i + 1),
            ));
        }
        prev = p;
    }

    let nnz = (prev - b) as usize;
    if ind.len() < nnz {
        return Err(Error::invalid_size(
            "ind",
            format!("{} indices for {nnz} entries", ind.len()),
        ));
    }
    if let Some((pos, &bad)) = ind[..nnz]
        .iter()
        .enumerate()
        .find(|&(_, &i)| i < b || (i - b) as usize >= minor)
    {
        return Err(Error::invalid_value(
            "ind",
            format!("index {bad} at position {pos} outside [{b}, {})", b as usize + minor),
        ));
    }
    Ok(nnz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ell_slots() {
        assert_eq!(ell_index(2, 0, 5), 2);
        assert_eq!(ell_index(2, 3, 5), 17);
        assert!(ell_slot_is_valid(0, IndexBase::Zero, 4));
        assert!(!ell_slot_is_valid(0, IndexBase::One, 4));
        assert!(ell_slot_is_valid(4, IndexBase::One, 4));
        assert!(!ell_slot_is_valid(ELL_PADDING, IndexBase::Zero, 4));
        assert!(!ell_slot_is_valid(4, IndexBase::Zero, 4));
    }

    #[test]
    fn test_check_compressed() {
        // [1 0 2]
        // [0 0 3]
        let ptr = [0, 2, 3];
        let ind = [0, 2, 2];
        assert_eq!(check_compressed(&ptr, &ind, IndexBase::Zero, 3).unwrap(), 3);

        let ptr1 = [1, 3, 4];
        let ind1 = [1, 3, 3];
        assert_eq!(check_compressed(&ptr1, &ind1, IndexBase::One, 3).unwrap(), 3);

        assert!(check_compressed(&[0, 2, 1], &ind, IndexBase::Zero, 3).is_err());
        assert!(check_compressed(&ptr, &[0, 3, 2], IndexBase::Zero, 3).is_err());
        assert!(check_compressed(&ptr1, &ind1, IndexBase::Zero, 3).is_err());
        assert!(check_compressed(&[], &[], IndexBase::Zero, 3).is_err());
    }
}
