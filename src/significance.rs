//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use fishers_exact::fishers_exact;

//
// Two-sided Fisher's Exact Test for the table
//
//      [[ a1, a2 ],
//       [ b1, b2 ]]
//
// Tables with an empty row or column have only one possible arrangement
// and return 1.0.
//
pub fn significance(a1: u32, a2: u32, b1: u32, b2: u32) -> f64
{
    let table = canonical_table(a1, a2, b1, b2);
    let [a, b, c, d] = table.map(|x| x as u64);

    let row1 = a + b;
    let row2 = c + d;
    let col1 = a + c;
    let n = row1 + row2;
    if n == 0 || row1 == 0 || row2 == 0 || col1 == 0 || col1 == n {
        return 1.0;
    }

    // only counts beyond i32::MAX are rejected, treated as no evidence
    match fishers_exact(&table) {
        Ok(result) => return result.two_tail_pvalue.min(1.0),
        Err(_) => return 1.0
    }
}

//
// Departure of reads1/reads2 from an even split, used when testing heterozygosity
//
pub fn significance_vs_even_split(reads1: u32, reads2: u32) -> f64
{
    let expected = (reads1 + reads2) / 2;
    return significance(reads1, reads2, expected, expected);
}

// The test is invariant to swapping rows, swapping columns and transposing.
// Evaluate every equivalent table in one fixed orientation so that equivalent
// inputs give bit-identical results.
fn canonical_table(a: u32, b: u32, c: u32, d: u32) -> [u32; 4] {
    let candidates = [
        [a, b, c, d], [c, d, a, b], [b, a, d, c], [d, c, b, a],
        [a, c, b, d], [b, d, a, c], [c, a, d, b], [d, b, c, a],
    ];
    return *candidates.iter().min().unwrap_or(&[a, b, c, d]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_known_values() {
        let e = 1e-6;
        assert_abs_diff_eq!(significance(3, 1, 1, 3), 0.4857143, epsilon = e);
        assert_abs_diff_eq!(significance(20, 0, 10, 10), 0.0004359198, epsilon = e);
        assert_abs_diff_eq!(significance(1, 9, 10, 14), 0.1132603, epsilon = e);
        assert_abs_diff_eq!(significance(10, 10, 10, 10), 1.0, epsilon = e);
    }

    #[test]
    fn test_degenerate_tables() {
        assert_eq!(significance(0, 0, 0, 0), 1.0);
        assert_eq!(significance(5, 0, 7, 0), 1.0);
        assert_eq!(significance(0, 0, 3, 9), 1.0);
    }

    #[test]
    fn test_symmetry() {
        let tables = [ (3, 1, 1, 3), (20, 0, 10, 10), (7, 2, 13, 40), (0, 5, 9, 1), (1000, 3, 950, 60) ];
        for (a, b, c, d) in tables {
            let p = significance(a, b, c, d);
            assert_eq!(p, significance(c, d, a, b));
            assert_eq!(p, significance(b, a, d, c));
        }
    }

    #[test]
    fn test_matches_direct_test() {
        let tables = [ [10, 10, 20, 0], [3, 1, 1, 3], [15, 15, 20, 0], [1000, 3, 950, 60] ];
        for t in tables {
            let direct = fishers_exact(&t).unwrap().two_tail_pvalue.min(1.0);
            assert_abs_diff_eq!(significance(t[0], t[1], t[2], t[3]), direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_deep_coverage_is_stable() {
        let p = significance(2500, 2500, 2400, 2600);
        assert!(p > 0.0 && p <= 1.0);

        let p = significance(5000, 0, 2500, 2500);
        assert!(p >= 0.0 && p < 1e-100);

        let p = significance(3000, 3000, 3000, 3000);
        assert_abs_diff_eq!(p, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_even_split() {
        assert_abs_diff_eq!(significance_vs_even_split(10, 10), 1.0, epsilon = 1e-9);
        assert!(significance_vs_even_split(30, 2) < 1e-3);
        assert_eq!(significance_vs_even_split(0, 0), 1.0);
    }
}
