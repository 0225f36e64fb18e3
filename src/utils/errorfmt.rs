#[cfg(test)]
mod tests;

use std::{
    error::Error,
    fmt::{Display, Formatter},
    iter,
};

/// Formats an error together with its chain of sources, separated by `: `.
pub struct ErrorFmt<E>(pub E);

impl<E: Error> Display for ErrorFmt<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let chain = iter::successors(Some(&self.0 as &dyn Error), |&e| e.source());
        for (idx, e) in chain.enumerate() {
            if idx > 0 {
                f.write_str(": ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}
