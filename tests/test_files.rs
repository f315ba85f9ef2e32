//! End-to-end tests over realistic CP2K file excerpts: multi-entry parsing,
//! re-serialization, and the parse -> filter -> dedup ingestion flow.

use cp2k_files::{
    BasisFormats, BasisSet, Cp2kFileError, DuplicateHandling, ExistingEntry, Filters,
    Pseudopotential, Result,
};

const GTH_POTENTIALS: &str = "\
# GTH potentials, PBE functional
H GTH-PBE-q1 GTH-PBE
    1
     0.20000000    2    -4.17890044     0.72446331
    0
#
Li GTH-PBE-q3
    3
     0.40000000    4   -14.08115455     9.62621962    -1.78361605     0.08515207
    0
C GTH-PBE-q4 GTH-PBE
    2    2
     0.33847124    2    -8.80367398     1.33921085
    1
     0.30257575    1     9.62248665
";

const BASIS_MOLOPT: &str = "\
# MOLOPT basis sets
H SZV-MOLOPT-GTH SZV-MOLOPT-GTH-q1
 1
 2 0 0 7 1
     11.478000339908  0.024916243200
      3.700758562763  0.079825490000
      1.446884268432  0.128862675300
      0.716814589696  0.379448894600
      0.247918564176  0.324552432600
      0.066918004004  0.037148121400
      0.021708243634 -0.001125195500
O  SZV-MOLOPT-GTH SZV-MOLOPT-GTH-q6
 1
 2 0 1 7 1 1
     12.015954705512 -0.060190841200  0.036543638800
      5.108150287385 -0.129597923300  0.120927648700
      2.048398039874  0.118175889400  0.251093670300
      0.832381575582  0.462964485000  0.352639910300
      0.352316246455  0.450353782600  0.294708645200
      0.142977330880  0.092715833600  0.173039869300
      0.046760918300 -0.000255945800  0.009726110600
";

#[test]
fn parse_gth_potentials_file() {
    let pseudos = Pseudopotential::parse_all(GTH_POTENTIALS).unwrap();

    assert_eq!(pseudos.len(), 3);

    assert_eq!(pseudos[0].element, "H");
    assert_eq!(pseudos[0].name, "GTH-PBE-q1");
    assert_eq!(pseudos[0].aliases, vec!["GTH-PBE-q1", "GTH-PBE"]);
    assert_eq!(pseudos[0].local.coeffs.len(), 2);

    assert_eq!(pseudos[1].element, "Li");
    assert_eq!(pseudos[1].aliases, vec!["GTH-PBE-q3"]);
    assert_eq!(pseudos[1].n_el, vec![3]);
    assert_eq!(pseudos[1].local.coeffs.len(), 4);

    assert_eq!(pseudos[2].element, "C");
    assert_eq!(pseudos[2].n_el, vec![2, 2]);
    assert_eq!(pseudos[2].non_local.len(), 1);
    assert_eq!(pseudos[2].non_local[0].coeffs, vec![9.62248665]);
}

#[test]
fn reserialize_gth_potentials_entries() {
    // Entry boundaries and numeric columns survive a write/read cycle.
    let pseudos = Pseudopotential::parse_all(GTH_POTENTIALS).unwrap();

    let mut out = String::new();
    for p in &pseudos {
        out.push_str(&p.to_cp2k_string(Some("regenerated")).unwrap());
    }

    assert_eq!(Pseudopotential::parse_all(&out).unwrap(), pseudos);
}

#[test]
fn parse_basis_file() {
    let sets = BasisSet::parse_all(BASIS_MOLOPT).unwrap();

    assert_eq!(sets.len(), 2);

    // The -qN identifier is longer, so it becomes the primary name.
    assert_eq!(sets[0].name, "SZV-MOLOPT-GTH-q1");
    assert_eq!(sets[0].aliases, vec!["SZV-MOLOPT-GTH-q1", "SZV-MOLOPT-GTH"]);
    assert_eq!(sets[0].tags, vec!["SZV", "MOLOPT", "GTH", "q1"]);
    assert_eq!(sets[0].blocks[0].coefficients.len(), 7);

    assert_eq!(sets[1].element, "O");
    assert_eq!(sets[1].blocks[0].l, vec![(0, 1), (1, 1)]);
    assert_eq!(sets[1].blocks[0].coefficients[6][2], 0.009726110600);
}

#[test]
fn reserialize_basis_entries() {
    let sets = BasisSet::parse_all(BASIS_MOLOPT).unwrap();
    let fmts = BasisFormats::default();

    let mut out = String::new();
    for bs in &sets {
        out.push_str(&bs.to_cp2k_string(&fmts).unwrap());
    }

    let reparsed = BasisSet::parse_all(&out).unwrap();

    assert_eq!(reparsed.len(), 2);
    assert_eq!(reparsed[0].blocks, sets[0].blocks);
    assert_eq!(reparsed[1].blocks, sets[1].blocks);
    // The primary name round-trips; extra aliases live only in source files.
    assert_eq!(reparsed[0].name, sets[0].name);
}

fn store_with(element: &'static str, name: &'static str, version: u32) -> impl Fn(&str, &str) -> Result<Option<ExistingEntry>> {
    move |el: &str, nm: &str| {
        if el == element && nm == name {
            Ok(Some(ExistingEntry {
                id: "uuid-0001".to_string(),
                version,
            }))
        } else {
            Ok(None)
        }
    }
}

#[test]
fn ingest_flow_new_policy() {
    let store = store_with("H", "GTH-PBE-q1", 3);

    let pseudos = Pseudopotential::from_cp2k(
        GTH_POTENTIALS,
        &Filters::default(),
        DuplicateHandling::New,
        &store,
        false,
    )
    .unwrap();

    assert_eq!(pseudos.len(), 3);
    assert_eq!(pseudos[0].version, 4); // bumped past the existing version 3
    assert_eq!(pseudos[1].version, 1);
    assert_eq!(pseudos[2].version, 1);
}

#[test]
fn ingest_flow_ignore_policy() {
    let store = store_with("H", "GTH-PBE-q1", 3);

    let pseudos = Pseudopotential::from_cp2k(
        GTH_POTENTIALS,
        &Filters::default(),
        DuplicateHandling::Ignore,
        &store,
        false,
    )
    .unwrap();

    let elements: Vec<&str> = pseudos.iter().map(|p| p.element.as_str()).collect();
    assert_eq!(elements, vec!["Li", "C"]);
}

#[test]
fn ingest_flow_error_policy() {
    let store = store_with("H", "GTH-PBE-q1", 3);

    let err = Pseudopotential::from_cp2k(
        GTH_POTENTIALS,
        &Filters::default(),
        DuplicateHandling::Error,
        &store,
        false,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        Cp2kFileError::DuplicateExists { element, name, .. }
            if element == "H" && name == "GTH-PBE-q1"
    ));
}

#[test]
fn ingest_flow_with_element_filter() {
    let empty_store = |_: &str, _: &str| -> Result<Option<ExistingEntry>> { Ok(None) };

    let filters = Filters {
        element: Some(Box::new(|el: &str| el == "O")),
        ..Default::default()
    };

    let sets = BasisSet::from_cp2k(
        BASIS_MOLOPT,
        &filters,
        DuplicateHandling::Ignore,
        &empty_store,
    )
    .unwrap();

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].element, "O");
}

#[test]
fn ingest_ignore_invalid_entries() {
    let text = format!("{GTH_POTENTIALS}X BROKEN-q1\n    1\n     0.40000000    2     1.0\n    0\n");
    let empty_store = |_: &str, _: &str| -> Result<Option<ExistingEntry>> { Ok(None) };

    // Strict mode aborts on the malformed trailing entry.
    assert!(
        Pseudopotential::from_cp2k(
            &text,
            &Filters::default(),
            DuplicateHandling::Ignore,
            &empty_store,
            false,
        )
        .is_err()
    );

    // Lenient mode keeps the three well-formed entries.
    let pseudos = Pseudopotential::from_cp2k(
        &text,
        &Filters::default(),
        DuplicateHandling::Ignore,
        &empty_store,
        true,
    )
    .unwrap();

    assert_eq!(pseudos.len(), 3);
}
