//! Property test for spec §8 invariant 6: if `hamming(h1, h2) <= 3`, at
//! least one of the 4 x 16-bit bands of h1 equals the corresponding band
//! of h2. Exercised against near-duplicate pairs generated by swapping one
//! word in an otherwise-shared sentence, which is the realistic source of
//! small-Hamming-distance pairs this pipeline needs to catch (§4.G step 4).

use proptest::prelude::*;
use sentryfeed_clean::{bands, hamming_distance, simhash};

const WORDS: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon",
];

fn arb_sentence() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..WORDS.len(), 8..20)
}

fn render(indices: &[usize]) -> String {
    indices.iter().map(|i| WORDS[*i]).collect::<Vec<_>>().join(" ")
}

proptest! {
    #[test]
    fn band_recall_holds_whenever_hamming_distance_is_small(
        base in arb_sentence(),
        swap_index in 0..8usize,
        replacement in 0..WORDS.len(),
    ) {
        let mut mutated = base.clone();
        let idx = swap_index.min(mutated.len().saturating_sub(1));
        if mutated.is_empty() {
            return Ok(());
        }
        mutated[idx] = replacement;

        let h1 = simhash(&render(&base));
        let h2 = simhash(&render(&mutated));

        if hamming_distance(h1, h2) <= 3 {
            let b1 = bands(h1);
            let b2 = bands(h2);
            prop_assert!(
                b1.iter().zip(b2.iter()).any(|(x, y)| x == y),
                "no shared band for h1={h1:016x} h2={h2:016x}"
            );
        }
    }

    #[test]
    fn bands_always_reconstruct_the_original_hash(h in any::<u64>()) {
        let b = bands(h);
        let reconstructed = (b[0] as u64)
            | ((b[1] as u64) << 16)
            | ((b[2] as u64) << 32)
            | ((b[3] as u64) << 48);
        prop_assert_eq!(reconstructed, h);
    }
}
