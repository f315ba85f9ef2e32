//! Round-trip laws: parse(serialize(record)) == record, field for field.
//!
//! Records are generated from a deterministic PRNG, with every float drawn
//! from a binary-exact grid (multiples of 1/4096 for basis sets, 1/256 for
//! pseudopotentials) so the fixed-precision columns lose nothing and equality
//! is exact.

use cp2k_files::{
    BasisFormats, BasisSet, Block, LocalPart, NonLocalProjector, Pseudopotential,
};

struct Lcg(u64);

impl Lcg {
    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    /// Uniform in `lo..=hi`.
    fn in_range(&mut self, lo: u32, hi: u32) -> u32 {
        lo + self.next_u32() % (hi - lo + 1)
    }

    /// Multiples of 1/4096 in [-2, 2): exact in both binary and 12-digit
    /// decimal.
    fn coefficient(&mut self) -> f64 {
        self.in_range(0, 4 * 4096 - 1) as f64 / 4096.0 - 2.0
    }

    /// Positive multiples of 1/4096 up to 4096.
    fn exponent(&mut self) -> f64 {
        self.in_range(1, 4096 * 4096) as f64 / 4096.0
    }

    /// Multiples of 1/256 in (0, 2]: exact in 8-digit decimal.
    fn radius(&mut self) -> f64 {
        self.in_range(1, 512) as f64 / 256.0
    }

    /// Multiples of 1/256 in [-8, 8).
    fn gth_coefficient(&mut self) -> f64 {
        self.in_range(0, 16 * 256 - 1) as f64 / 256.0 - 8.0
    }
}

fn random_basis_set(rng: &mut Lcg) -> BasisSet {
    let name = "RT-TEST-q4".to_string();

    let n_blocks = rng.in_range(1, 3);
    let mut blocks = Vec::new();

    for _ in 0..n_blocks {
        let lmin = rng.in_range(0, 1);
        let n_l = rng.in_range(1, 5); // 1-5 angular momenta
        let l: Vec<(u32, u32)> = (lmin..lmin + n_l)
            .map(|am| (am, rng.in_range(1, 3)))
            .collect();
        let total_shells: u32 = l.iter().map(|&(_, ns)| ns).sum();

        let nexp = rng.in_range(1, 8); // 1-8 exponents
        let coefficients: Vec<Vec<f64>> = (0..nexp)
            .map(|_| {
                let mut row = vec![rng.exponent()];
                row.extend((0..total_shells).map(|_| rng.coefficient()));
                row
            })
            .collect();

        blocks.push(Block {
            n: rng.in_range(1, 4),
            l,
            coefficients,
        });
    }

    BasisSet {
        element: "C".to_string(),
        tags: name.split('-').map(str::to_string).collect(),
        aliases: vec![name.clone()],
        name,
        blocks,
        version: 1,
    }
}

fn random_pseudopotential(rng: &mut Lcg) -> Pseudopotential {
    let name = "RT-GTH-q6".to_string();

    let n_channels = rng.in_range(0, 3);
    let non_local = (0..n_channels)
        .map(|_| {
            let nproj = rng.in_range(0, 3);
            let coeffs = (0..NonLocalProjector::packed_len(nproj))
                .map(|_| rng.gth_coefficient())
                .collect();

            NonLocalProjector {
                r: rng.radius(),
                nproj,
                coeffs,
            }
        })
        .collect();

    Pseudopotential {
        element: "Mo".to_string(),
        tags: name.split('-').map(str::to_string).collect(),
        aliases: vec![name.clone(), "RT-GTH".to_string()],
        name,
        n_el: (0..rng.in_range(1, 3)).map(|_| rng.in_range(0, 4)).collect(),
        local: LocalPart {
            r: rng.radius(),
            coeffs: (0..rng.in_range(0, 4)).map(|_| rng.gth_coefficient()).collect(),
        },
        non_local,
        version: 1,
    }
}

#[test]
fn basis_set_roundtrip() {
    let mut rng = Lcg(0xdead_beef);
    let fmts = BasisFormats::default();

    for i in 0..200 {
        let bs = random_basis_set(&mut rng);
        let text = bs.to_cp2k_string(&fmts).unwrap();
        let reparsed = BasisSet::new(&text).unwrap();

        assert_eq!(reparsed, bs, "case {i}:\n{text}");
    }
}

#[test]
fn pseudopotential_roundtrip() {
    let mut rng = Lcg(0x5eed);

    for i in 0..200 {
        let p = random_pseudopotential(&mut rng);
        let text = p.to_cp2k_string(None).unwrap();
        let reparsed = Pseudopotential::new(&text).unwrap();

        assert_eq!(reparsed, p, "case {i}:\n{text}");
    }
}

#[test]
fn pseudopotential_roundtrip_with_comment() {
    let mut rng = Lcg(0xc0ffee);

    let p = random_pseudopotential(&mut rng);
    let text = p.to_cp2k_string(Some("regenerated for regression testing")).unwrap();

    assert_eq!(Pseudopotential::new(&text).unwrap(), p);
}
