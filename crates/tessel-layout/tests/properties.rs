use std::collections::HashSet;

use proptest::prelude::*;
use tessel_layout::{CoordinateStep, Index, TensorCoordinate, TensorDescriptor, Transform};

/// `(a*b, c)` strided tensor, split into `(a, b)`, padded along `c`.
fn split_and_pad(a: Index, b: Index, c: Index, left: Index, right: Index, extra: Index) -> TensorDescriptor {
    TensorDescriptor::naive([a * b, c], [c + extra, 1])
        .unwrap()
        .transform(
            vec![
                Transform::unmerge(vec![a, b]).unwrap(),
                Transform::pad(c, left, right).unwrap(),
            ],
            vec![vec![0], vec![1]],
            vec![vec![0, 1], vec![2]],
        )
        .unwrap()
}

/// Same chain with every dimension merged back into one.
fn merged(a: Index, b: Index, c: Index, left: Index, right: Index, extra: Index) -> TensorDescriptor {
    split_and_pad(a, b, c, left, right, extra)
        .transform(
            vec![Transform::merge(vec![a, b, c + left + right]).unwrap()],
            vec![vec![0, 1, 2]],
            vec![vec![0]],
        )
        .unwrap()
}

fn pick(seed: u64, length: Index) -> Index {
    (seed % length as u64) as Index
}

fn all_indices(lengths: &[Index]) -> Vec<Vec<Index>> {
    let mut out = vec![vec![]];
    for length in lengths {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (0..*length).map(move |i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    out
}

proptest! {
    #[test]
    fn merged_step_matches_recompute(
        a in 1i64..4, b in 1i64..4, c in 1i64..6,
        left in 0i64..3, right in 0i64..3, extra in 0i64..3,
        start in any::<u64>(), end in any::<u64>(),
    ) {
        let desc = merged(a, b, c, left, right, extra);
        let length = desc.length(0);
        let start = pick(start, length);
        let end = pick(end, length);

        let mut coord = TensorCoordinate::new(&desc, &[start]);
        let step = CoordinateStep::new(&desc, &[end - start]);
        coord.move_by(&desc, &step);
        let fresh = TensorCoordinate::new(&desc, &[end]);

        prop_assert_eq!(coord.offset(), fresh.offset());
        prop_assert_eq!(coord.hidden(), fresh.hidden());
        prop_assert_eq!(coord.is_valid(&desc), fresh.is_valid(&desc));
    }

    #[test]
    fn multi_dim_step_matches_recompute(
        a in 1i64..4, b in 1i64..4, c in 1i64..6,
        left in 0i64..3, right in 0i64..3, extra in 0i64..3,
        seeds in prop::array::uniform6(any::<u64>()),
    ) {
        let desc = split_and_pad(a, b, c, left, right, extra);
        let lengths = desc.lengths();
        let start: Vec<Index> = (0..3).map(|d| pick(seeds[d], lengths[d])).collect();
        let end: Vec<Index> = (0..3).map(|d| pick(seeds[d + 3], lengths[d])).collect();
        let diff: Vec<Index> = end.iter().zip(start.iter()).map(|(e, s)| e - s).collect();

        let mut coord = TensorCoordinate::new(&desc, &start);
        coord.move_by_diff(&desc, &diff);

        prop_assert_eq!(coord, TensorCoordinate::new(&desc, &end));
    }

    #[test]
    fn embed_step_matches_recompute(
        lengths in prop::array::uniform3(1i64..5),
        coefficients in prop::array::uniform3(0i64..7),
        offset in 0i64..5,
        seeds in prop::array::uniform6(any::<u64>()),
    ) {
        let reach: Index = coefficients.iter().zip(lengths.iter()).map(|(c, l)| c * (l - 1)).sum();
        let desc = TensorDescriptor::packed([reach + offset + 1])
            .unwrap()
            .transform(
                vec![Transform::embed(lengths.to_vec(), coefficients.to_vec(), offset).unwrap()],
                vec![vec![0]],
                vec![vec![0, 1, 2]],
            )
            .unwrap();

        let start: Vec<Index> = (0..3).map(|d| pick(seeds[d], lengths[d])).collect();
        let end: Vec<Index> = (0..3).map(|d| pick(seeds[d + 3], lengths[d])).collect();
        let diff: Vec<Index> = end.iter().zip(start.iter()).map(|(e, s)| e - s).collect();

        let mut coord = TensorCoordinate::new(&desc, &start);
        coord.move_by_diff(&desc, &diff);
        prop_assert_eq!(coord.offset(), desc.calculate_offset(&end));
    }

    #[test]
    fn valid_offsets_are_injective(
        a in 1i64..4, b in 1i64..4, c in 1i64..5,
        left in 0i64..3, right in 0i64..3, extra in 0i64..3,
    ) {
        let desc = split_and_pad(a, b, c, left, right, extra);
        let mut seen = HashSet::new();
        let mut valid = 0;
        for index in all_indices(&desc.lengths()) {
            if desc.is_valid(&index) {
                valid += 1;
                prop_assert!(seen.insert(desc.calculate_offset(&index)), "duplicate offset at {:?}", index);
                prop_assert!(desc.calculate_offset(&index) < desc.element_space_size());
            }
        }
        prop_assert_eq!(valid, a * b * c);
    }

    #[test]
    fn padded_range_is_flagged(length in 1i64..8, pad in 0i64..5) {
        let desc = TensorDescriptor::packed([length])
            .unwrap()
            .transform(
                vec![Transform::right_pad(length, pad).unwrap()],
                vec![vec![0]],
                vec![vec![0]],
            )
            .unwrap();
        prop_assert_eq!(desc.length(0), length + pad);
        for i in 0..length + pad {
            prop_assert_eq!(desc.is_valid(&[i]), i < length);
        }
    }
}

#[test]
fn naive_descriptor_is_bijective_on_packed_lengths() {
    let desc = TensorDescriptor::packed([3, 4, 5]).unwrap();
    let offsets: HashSet<Index> = all_indices(&desc.lengths())
        .iter()
        .map(|index| desc.calculate_offset(index))
        .collect();
    assert_eq!(offsets.len(), 60);
    assert_eq!(offsets, (0..60).collect());
}
