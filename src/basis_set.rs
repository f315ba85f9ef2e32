//! For operating on CP2K `BASIS_SET` files, which describe contracted Gaussian
//! basis sets. The grammar is positional: how many coefficient rows follow a
//! block header, and how wide they are, is determined by counts read earlier
//! in the same entry.

use std::{fs, fs::File, path::Path};

use rayon::prelude::*;

use crate::{
    error::{Cp2kFileError, Result},
    ingest::{self, DuplicateHandling, Filters, IngestRecord, StoreLookup},
    parse::{EntryIter, FloatFormat, is_blank_or_comment, parse_float_row, split_identifiers},
};

/// One radial/angular-momentum grouping within a basis set.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "encode", derive(bincode::Encode, bincode::Decode))]
pub struct Block {
    /// Principal quantum number.
    pub n: u32,
    /// `(angular_momentum, shell_count)` pairs, contiguous from lmin to lmax.
    pub l: Vec<(u32, u32)>,
    /// One row per exponent. Col 0 is the Gaussian exponent; the remaining
    /// cols are contraction coefficients, one per shell.
    pub coefficients: Vec<Vec<f64>>,
}

impl Block {
    pub fn total_shells(&self) -> usize {
        self.l.iter().map(|&(_, nshell)| nshell as usize).sum()
    }
}

/// Column formats for serialization. The defaults reproduce the fixed-width
/// layout CP2K's reader expects; override them for wider or narrower columns.
#[derive(Clone, Copy, Debug)]
pub struct BasisFormats {
    pub exponent: FloatFormat,
    pub coefficient: FloatFormat,
}

impl Default for BasisFormats {
    fn default() -> Self {
        Self {
            exponent: FloatFormat::new(18, 12, false),
            coefficient: FloatFormat::new(14, 12, true),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "encode", derive(bincode::Encode, bincode::Decode))]
pub struct BasisSet {
    /// Chemical element symbol, 1-3 letters.
    pub element: String,
    /// Primary identifier, conventionally `<family>-<size>[-q<n_valence>]`.
    pub name: String,
    /// `name` split on `-`.
    pub tags: Vec<String>,
    /// `name` first, then any further identifiers found on the header line.
    pub aliases: Vec<String>,
    pub blocks: Vec<Block>,
    /// Monotonically increasing per `(element, name)`; reassigned only by
    /// ingestion under the `new` duplicate policy.
    pub version: u32,
}

impl BasisSet {
    /// From the text of exactly one basis set entry.
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
            return Err(truncated("empty basis set entry"));
        }

        let (element, name, tags, aliases) = split_identifiers(lines[0])?;

        // The second line carries the number of blocks ("sets") that follow.
        let count_line = lines.get(1).ok_or_else(|| truncated("missing set-count line"))?;
        let n_blocks: usize =
            count_line
                .trim()
                .parse()
                .map_err(|_| Cp2kFileError::MalformedHeader {
                    line: count_line.to_string(),
                })?;

        let mut nline = 2;
        // The declared count is untrusted input; clamp the capacity hint so a
        // hostile value errors as a truncation instead of overflowing alloc.
        let mut blocks = Vec::with_capacity(n_blocks.min(lines.len()));

        for _ in 0..n_blocks {
            let header = lines
                .get(nline)
                .ok_or_else(|| truncated("missing block header"))?;
            nline += 1;

            // n lmin lmax nexp nshell(lmin) nshell(lmin+1) ... nshell(lmax)
            let qn: Vec<u32> = header
                .split_whitespace()
                .map(|tok| tok.parse::<u32>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| malformed_block(header))?;

            if qn.len() < 4 {
                return Err(malformed_block(header));
            }

            let (n, lmin, lmax, nexp) = (qn[0], qn[1], qn[2], qn[3] as usize);

            if lmax < lmin || qn.len() != 4 + (lmax - lmin + 1) as usize {
                return Err(malformed_block(header));
            }

            let l: Vec<(u32, u32)> = (lmin..=lmax).zip(qn[4..].iter().copied()).collect();
            let total_shells: usize = qn[4..].iter().map(|&s| s as usize).sum();

            let mut coefficients =
                Vec::with_capacity(nexp.min(lines.len().saturating_sub(nline)));

            for i in 0..nexp {
                let src = lines
                    .get(nline + i)
                    .ok_or_else(|| truncated("missing coefficient row"))?;

                let row = parse_float_row(src)?;
                // Exact width, matching what validate() and the serializer
                // require of the record.
                if row.len() != 1 + total_shells {
                    return Err(Cp2kFileError::MalformedCoefficientRow {
                        line: src.to_string(),
                    });
                }

                coefficients.push(row);
            }

            // Advance by the number of exponents.
            nline += nexp;

            blocks.push(Block { n, l, coefficients });
        }

        Ok(Self {
            element,
            name,
            tags,
            aliases,
            blocks,
            version: 1,
        })
    }

    /// Lazily parse every entry in a `BASIS_SET` file, in file order.
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

    /// Parse, filter, and resolve duplicates against an external store in one
    /// call. Returns the records ready to persist; never stores anything
    /// itself.
    pub fn from_cp2k<L: StoreLookup>(
        text: &str,
        filters: &Filters,
        duplicate_handling: DuplicateHandling,
        lookup: &L,
    ) -> Result<Vec<Self>> {
        ingest::ingest(Self::parse_all(text)?, filters, duplicate_handling, lookup)
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

        for (i, block) in self.blocks.iter().enumerate() {
            if block.l.is_empty() {
                violations.push(format!("blocks[{i}].l: empty"));
                continue;
            }
            if block.l.windows(2).any(|w| w[1].0 != w[0].0 + 1) {
                violations.push(format!("blocks[{i}].l: angular momenta not contiguous"));
            }

            let want = 1 + block.total_shells();
            for (j, row) in block.coefficients.iter().enumerate() {
                if row.len() != want {
                    violations.push(format!(
                        "blocks[{i}].coefficients[{j}]: {} fields, expected {want}",
                        row.len()
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Cp2kFileError::InvalidRecord { violations })
        }
    }

    /// Render to CP2K `BASIS_SET` text. Round-trips through the parser.
    /// All-or-nothing: validation runs before anything is produced.
    pub fn to_cp2k_string(&self, fmts: &BasisFormats) -> Result<String> {
        self.validate()?;

        let mut s = String::new();

        s.push_str(&format!("{} {}\n", self.element, self.name));
        s.push_str(&format!("{}\n", self.blocks.len()));

        for block in &self.blocks {
            let lmin = block.l[0].0;
            let lmax = block.l[block.l.len() - 1].0;

            s.push_str(&format!(
                "{} {} {} {} ",
                block.n,
                lmin,
                lmax,
                block.coefficients.len()
            ));
            let shells: Vec<String> = block.l.iter().map(|&(_, ns)| ns.to_string()).collect();
            s.push_str(&shells.join(" "));
            s.push('\n');

            for row in &block.coefficients {
                s.push_str(&fmts.exponent.format(row[0]));
                s.push(' ');
                let coeffs: Vec<String> =
                    row[1..].iter().map(|&c| fmts.coefficient.format(c)).collect();
                s.push_str(&coeffs.join(" "));
                s.push('\n');
            }
        }

        Ok(s)
    }

    pub fn write_cp2k<W: std::io::Write>(&self, out: &mut W, fmts: &BasisFormats) -> Result<()> {
        let text = self.to_cp2k_string(fmts)?;
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

    /// Writes a single-entry file with the default CP2K formats.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        self.write_cp2k(&mut file, &BasisFormats::default())
    }
}

impl IngestRecord for BasisSet {
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
