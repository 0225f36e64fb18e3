use {crate::utils::errorfmt::ErrorFmt, std::io, thiserror::Error};

#[derive(Debug, Error)]
enum Outer {
    #[error("Could not load the config")]
    Load(#[source] Inner),
}

#[derive(Debug, Error)]
enum Inner {
    #[error("Could not read the file")]
    Read(#[source] io::Error),
}

#[test]
fn prints_the_source_chain() {
    let e = Outer::Load(Inner::Read(io::Error::other("disk on fire")));
    assert_eq!(
        ErrorFmt(&e).to_string(),
        "Could not load the config: Could not read the file: disk on fire"
    );
}

#[test]
fn single_error_has_no_separator() {
    assert_eq!(ErrorFmt(io::Error::other("nope")).to_string(), "nope");
}
