//! Integration tests for harbor-semver.

use harbor_semver::{Version, VersionSet};

fn v(s: &str) -> Version {
    s.parse().unwrap()
}

fn range(lo: &str, hi: &str) -> VersionSet {
    VersionSet::range(v(lo), v(hi))
}

// A small universe of version sets used by the algebra properties.
fn universe() -> Vec<VersionSet> {
    vec![
        VersionSet::Any,
        VersionSet::Empty,
        VersionSet::exact(v("0.1.0")),
        VersionSet::exact(v("1.5.0")),
        VersionSet::exact(v("2.0.0")),
        range("0.1.0", "1.0.0"),
        range("1.0.0", "2.0.0"),
        range("1.2.0", "1.8.0"),
        range("1.5.0", "3.0.0"),
        VersionSet::upto_next_major(v("1.0.0")),
        VersionSet::upto_next_minor(v("1.4.2")),
    ]
}

#[test]
fn test_intersection_commutative() {
    for a in universe() {
        for b in universe() {
            assert_eq!(a.intersection(&b), b.intersection(&a), "{} ∩ {}", a, b);
        }
    }
}

#[test]
fn test_intersection_associative() {
    for a in universe() {
        for b in universe() {
            for c in universe() {
                assert_eq!(
                    a.intersection(&b.intersection(&c)),
                    a.intersection(&b).intersection(&c),
                    "{}, {}, {}",
                    a,
                    b,
                    c
                );
            }
        }
    }
}

#[test]
fn test_intersection_members_agree() {
    // Membership in an intersection must equal membership in both operands.
    let samples = [
        v("0.1.0"),
        v("0.9.9"),
        v("1.0.0"),
        v("1.4.2"),
        v("1.5.0"),
        v("1.9.9"),
        v("2.0.0"),
        v("2.5.0"),
    ];
    for a in universe() {
        for b in universe() {
            let both = a.intersection(&b);
            for version in &samples {
                assert_eq!(
                    both.contains(version),
                    a.contains(version) && b.contains(version),
                    "{} in {} ∩ {}",
                    version,
                    a,
                    b
                );
            }
        }
    }
}

#[test]
fn test_version_total_order() {
    let mut versions = vec![
        v("2.0.0"),
        v("1.0.0-alpha"),
        v("1.0.0"),
        v("1.0.0-alpha.1"),
        v("1.0.0-beta"),
        v("0.9.0"),
        v("1.0.1"),
    ];
    versions.sort();
    let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "0.9.0",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-beta",
            "1.0.0",
            "1.0.1",
            "2.0.0"
        ]
    );
}

#[test]
fn test_display_parse_roundtrip() {
    for s in [
        "0.0.0",
        "1.2.3",
        "10.20.30",
        "1.0.0-alpha.2",
        "2.0.0-rc.1+build.17",
    ] {
        assert_eq!(v(s).to_string(), s);
    }
}
