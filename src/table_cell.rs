use crate::region::Region;
use crate::Result;

pub(crate) trait ToTableCell {
    /// Format for viewing in a table cell
    fn to_cell(&self) -> String;
}

impl ToTableCell for String {
    fn to_cell(&self) -> String {
        // A tab would start a new column
        self.replace('\t', " ")
    }
}

impl ToTableCell for &str {
    fn to_cell(&self) -> String {
        self.to_string().to_cell()
    }
}

impl ToTableCell for Region {
    fn to_cell(&self) -> String {
        self.code().to_string()
    }
}

impl<T: ToTableCell> ToTableCell for Option<T> {
    fn to_cell(&self) -> String {
        match self {
            Some(s) => s.to_cell(),
            None => "-".to_string(),
        }
    }
}

/// `ok`, or the error that keeps the row from being synthesized
impl<T> ToTableCell for Result<T> {
    fn to_cell(&self) -> String {
        match self {
            Ok(_) => "ok".to_string(),
            Err(err) => err.to_string().to_cell(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_cells() {
        assert_eq!("a\tb".to_cell(), "a b");
        assert_eq!(Some(Region::ApSouth2).to_cell(), "ap-south-2");
        assert_eq!(None::<Region>.to_cell(), "-");
        assert_eq!(Ok::<_, Error>(()).to_cell(), "ok");
        let err: Result<()> = Err(Error::UnknownStack { stack: "Nope".into() });
        assert_eq!(err.to_cell(), "Unknown stack \"Nope\"");
    }
}
