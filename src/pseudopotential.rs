//! For operating on CP2K `GTH_POTENTIALS` files, which describe
//! Goedecker-Teter-Hutter pseudopotentials: a local part plus one non-local
//! projector block per angular momentum channel. Non-local coupling
//! coefficients are stored packed: the upper triangle (diagonal included) of a
//! symmetric nproj x nproj matrix, row-major.

use std::{fs, fs::File, path::Path};

use rayon::prelude::*;

use crate::{
    error::{Cp2kFileError, Result},
    ingest::{self, DuplicateHandling, Filters, IngestRecord, StoreLookup},
    parse::{EntryIter, FloatFormat, is_blank_or_comment, split_identifiers},
};

// CP2K's GTH layout: width-15 floats with 8 fractional digits, width-5 ints.
const FLOAT_FMT: FloatFormat = FloatFormat::new(15, 8, false);
const INT_WIDTH: usize = 5;

/// The local part: Gaussian decay radius and polynomial coefficients.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "encode", derive(bincode::Encode, bincode::Decode))]
pub struct LocalPart {
    pub r: f64,
    pub coeffs: Vec<f64>,
}

/// One non-local projector channel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "encode", derive(bincode::Encode, bincode::Decode))]
pub struct NonLocalProjector {
    pub r: f64,
    pub nproj: u32,
    /// Packed upper triangle of the symmetric coupling matrix:
    /// `nproj * (nproj + 1) / 2` values, row-major with col >= row.
    pub coeffs: Vec<f64>,
}

impl NonLocalProjector {
    /// Coefficient count implied by `nproj`: the upper-triangle size.
    pub fn packed_len(nproj: u32) -> usize {
        let nproj = nproj as usize;
        nproj * (nproj + 1) / 2
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "encode", derive(bincode::Encode, bincode::Decode))]
pub struct Pseudopotential {
    /// Chemical element symbol, 1-3 letters.
    pub element: String,
    /// Primary identifier, conventionally `<family>-<functional>[-q<n_valence>]`.
    pub name: String,
    /// `name` split on `-`.
    pub tags: Vec<String>,
    /// `name` first, then any further identifiers found on the header line.
    pub aliases: Vec<String>,
    /// Valence electrons per angular momentum.
    pub n_el: Vec<u32>,
    pub local: LocalPart,
    pub non_local: Vec<NonLocalProjector>,
    /// Monotonically increasing per `(element, name)`; reassigned only by
    /// ingestion under the `new` duplicate policy.
    pub version: u32,
}

impl Pseudopotential {
    /// From the text of exactly one pseudopotential entry.
    pub fn new(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .filter(|l| !is_blank_or_comment(l))
            .map(str::trim)
            .collect();

        Self::from_lines(&lines)
    }

    /// Parses one entry from its trimmed, non-blank lines. All-or-nothing: no
    /// partial record is returned on failure.
    pub(crate) fn from_lines(lines: &[&str]) -> Result<Self> {
        if lines.is_empty() {
            return Err(truncated("empty pseudopotential entry"));
        }

        let (element, name, tags, aliases) = split_identifiers(lines[0])?;

        // n_elec(s) n_elec(p) n_elec(d) ...
        let n_el_line = lines
            .get(1)
            .ok_or_else(|| truncated("missing electron-configuration line"))?;
        let n_el: Vec<u32> = n_el_line
            .split_whitespace()
            .map(|tok| tok.parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| malformed_block(n_el_line))?;

        // r_loc nexp_ppl cexp_ppl(1) ... cexp_ppl(nexp_ppl)
        let local_line = lines
            .get(2)
            .ok_or_else(|| truncated("missing local-part line"))?;
        let local = parse_local(local_line)?;

        // nprj: the number of non-local channels that follow.
        let nprj_line = lines
            .get(3)
            .ok_or_else(|| truncated("missing projector-count line"))?;
        let nprj: usize = nprj_line
            .trim()
            .parse()
            .map_err(|_| malformed_block(nprj_line))?;

        let mut nline = 4;
        // Clamp the untrusted channel count so a hostile value cannot
        // overflow the allocation before the per-channel reads catch it.
        let mut non_local = Vec::with_capacity(nprj.min(lines.len()));

        for channel in 0..nprj {
            let (proj, consumed) = parse_projector(&lines[nline.min(lines.len())..], channel)?;
            nline += consumed;
            non_local.push(proj);
        }

        Ok(Self {
            element,
            name,
            tags,
            aliases,
            n_el,
            local,
            non_local,
            version: 1,
        })
    }

    /// Lazily parse every entry in a `GTH_POTENTIALS` file, in file order.
    pub fn iter_file(text: &str) -> impl Iterator<Item = Result<Self>> + '_ {
        EntryIter::new(text).map(|group| Self::from_lines(&group))
    }

    pub fn parse_all(text: &str) -> Result<Vec<Self>> {
        Self::iter_file(text).collect()
    }

    /// Entry-parallel variant of [`parse_all`](Self::parse_all); each entry's
    /// parse is a pure function of its lines.
    pub fn parse_all_par(text: &str) -> Result<Vec<Self>> {
        let groups: Vec<_> = EntryIter::new(text).collect();

        groups.par_iter().map(|group| Self::from_lines(group)).collect()
    }

    /// Like [`parse_all`](Self::parse_all), but skips malformed entries
    /// instead of aborting, returning the accumulated diagnostics alongside
    /// the records that did parse.
    pub fn parse_all_lenient(text: &str) -> (Vec<Self>, Vec<Cp2kFileError>) {
        let mut records = Vec::new();
        let mut diagnostics = Vec::new();

        for group in EntryIter::new(text) {
            match Self::from_lines(&group) {
                Ok(p) => records.push(p),
                Err(e) => {
                    eprintln!(
                        "Skipping invalid pseudopotential entry '{}': {e}",
                        group.first().copied().unwrap_or_default()
                    );
                    diagnostics.push(e);
                }
            }
        }

        (records, diagnostics)
    }

    /// Parse, filter, and resolve duplicates against an external store in one
    /// call. With `ignore_invalid`, malformed entries are skipped instead of
    /// aborting the stream. Returns the records ready to persist; never
    /// stores anything itself.
    pub fn from_cp2k<L: StoreLookup>(
        text: &str,
        filters: &Filters,
        duplicate_handling: DuplicateHandling,
        lookup: &L,
        ignore_invalid: bool,
    ) -> Result<Vec<Self>> {
        let records = if ignore_invalid {
            Self::parse_all_lenient(text).0
        } else {
            Self::parse_all(text)?
        };

        ingest::ingest(records, filters, duplicate_handling, lookup)
    }

    /// Structural invariant checks, re-run by the serializer before any bytes
    /// are written. Reports every violation, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.element.is_empty()
            || self.element.len() > 3
            || !self.element.chars().all(|c| c.is_ascii_alphabetic())
        {
            violations.push(format!("element: '{}' is not a 1-3 letter symbol", self.element));
        }
        if self.name.is_empty() {
            violations.push("name: empty".to_string());
        }
        if self.aliases.first() != Some(&self.name) {
            violations.push("aliases: must start with the primary name".to_string());
        }
        if self.n_el.is_empty() {
            violations.push("n_el: empty".to_string());
        }

        for (i, proj) in self.non_local.iter().enumerate() {
            let want = NonLocalProjector::packed_len(proj.nproj);
            if proj.coeffs.len() != want {
                violations.push(format!(
                    "non_local[{i}].coeffs: {} values, nproj={} requires {want}",
                    proj.coeffs.len(),
                    proj.nproj
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Cp2kFileError::InvalidRecord { violations })
        }
    }

    /// Render to CP2K `GTH_POTENTIALS` text, optionally annotated with a
    /// leading provenance comment (comment lines are ignored by the parser).
    /// Round-trips through the parser. All-or-nothing: validation runs before
    /// anything is produced.
    pub fn to_cp2k_string(&self, comment: Option<&str>) -> Result<String> {
        self.validate()?;

        let mut s = String::new();

        if let Some(comment) = comment {
            for line in comment.lines() {
                s.push_str(&format!("# {line}\n"));
            }
        }

        s.push_str(&format!("{} {}\n", self.element, self.aliases.join(" ")));

        for n in &self.n_el {
            s.push_str(&format!("{n:>INT_WIDTH$}"));
        }
        s.push('\n');

        s.push_str(&FLOAT_FMT.format(self.local.r));
        s.push_str(&format!("{:>INT_WIDTH$}", self.local.coeffs.len()));
        for c in &self.local.coeffs {
            s.push_str(&FLOAT_FMT.format(*c));
        }
        s.push('\n');

        s.push_str(&format!("{:>INT_WIDTH$}\n", self.non_local.len()));

        for proj in &self.non_local {
            s.push_str(&FLOAT_FMT.format(proj.r));
            s.push_str(&format!("{:>INT_WIDTH$}", proj.nproj));

            let nproj = proj.nproj as usize;
            if nproj == 0 {
                s.push('\n');
                continue;
            }

            // Upper triangle row-major; row i starts under matrix column i.
            let mut idx = 0;
            for row in 0..nproj {
                if row > 0 {
                    s.push_str(&" ".repeat(FLOAT_FMT.width + INT_WIDTH + FLOAT_FMT.width * row));
                }
                for _ in row..nproj {
                    s.push_str(&FLOAT_FMT.format(proj.coeffs[idx]));
                    idx += 1;
                }
                s.push('\n');
            }
        }

        Ok(s)
    }

    pub fn write_cp2k<W: std::io::Write>(&self, out: &mut W, comment: Option<&str>) -> Result<()> {
        let text = self.to_cp2k_string(comment)?;
        out.write_all(text.as_bytes())?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data_str = fs::read_to_string(path)?;
        Self::new(&data_str)
    }

    pub fn load_all(path: &Path) -> Result<Vec<Self>> {
        let data_str = fs::read_to_string(path)?;
        Self::parse_all(&data_str)
    }

    /// Writes a single-entry file, without a provenance comment.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        self.write_cp2k(&mut file, None)
    }
}

impl IngestRecord for Pseudopotential {
    fn element(&self) -> &str {
        &self.element
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

/// r_loc, a coefficient count, then exactly that many coefficients, all on
/// one line.
fn parse_local(line: &str) -> Result<LocalPart> {
    let mut toks = line.split_whitespace();

    let r: f64 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed_block(line))?;
    let nexp: usize = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed_block(line))?;

    let coeffs: Vec<f64> = toks
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| Cp2kFileError::MalformedCoefficientRow {
                    line: line.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    if coeffs.len() != nexp {
        return Err(Cp2kFileError::MalformedCoefficientRow {
            line: line.to_string(),
        });
    }

    Ok(LocalPart { r, coeffs })
}

/// One non-local channel: `r nproj` plus the packed upper triangle, which may
/// continue onto following (indented) lines until the count implied by nproj
/// is met. Returns the projector and the number of lines consumed.
fn parse_projector(lines: &[&str], channel: usize) -> Result<(NonLocalProjector, usize)> {
    let header = lines
        .first()
        .ok_or_else(|| truncated("missing non-local channel line"))?;

    let mut toks = header.split_whitespace();

    let r: f64 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed_block(header))?;
    let nproj: u32 = toks
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed_block(header))?;

    let expected = NonLocalProjector::packed_len(nproj);

    // nproj comes from the file, so `expected` is not a safe capacity hint.
    let mut coeffs = Vec::new();
    let mut consumed = 1;

    push_floats(&mut coeffs, toks, header)?;

    while coeffs.len() < expected {
        let Some(cont) = lines.get(consumed) else {
            // The count is knowably wrong, which beats a bare truncation error.
            return Err(Cp2kFileError::InvalidProjectorShape {
                channel,
                nproj,
                found: coeffs.len(),
                expected,
            });
        };
        consumed += 1;

        push_floats(&mut coeffs, cont.split_whitespace(), cont)?;
    }

    if coeffs.len() != expected {
        return Err(Cp2kFileError::InvalidProjectorShape {
            channel,
            nproj,
            found: coeffs.len(),
            expected,
        });
    }

    Ok((NonLocalProjector { r, nproj, coeffs }, consumed))
}

fn push_floats<'a>(
    out: &mut Vec<f64>,
    toks: impl Iterator<Item = &'a str>,
    line: &str,
) -> Result<()> {
    for tok in toks {
        let v = tok
            .parse::<f64>()
            .map_err(|_| Cp2kFileError::MalformedCoefficientRow {
                line: line.to_string(),
            })?;
        out.push(v);
    }

    Ok(())
}

fn truncated(context: &str) -> Cp2kFileError {
    Cp2kFileError::TruncatedInput {
        context: context.to_string(),
    }
}

fn malformed_block(line: &str) -> Cp2kFileError {
    Cp2kFileError::MalformedBlockHeader {
        line: line.to_string(),
    }
}
