//! A part source with room to put back a single part.
//!
//! Directory iterators find out that a directory has ended only by reading the first part that
//! is not part of it.  That part is handed back here so that the parent iterator sees it next.

use std::io;

use log::trace;

use crate::{
    error::{Error, Result},
    part::{Part, PartSource},
};

pub struct Lookahead {
    /// `None` once the underlying source reported the end of input.
    source: Option<Box<dyn PartSource>>,
    pending: Option<Part>,
}

impl Lookahead {
    pub fn new(source: impl PartSource + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
            pending: None,
        }
    }

    /// Returns the put-back part if there is one, otherwise the next part from the source.
    ///
    /// After the source reported the end of input it is dropped and never polled again.
    pub fn pull(&mut self) -> io::Result<Option<Part>> {
        if let Some(part) = self.pending.take() {
            return Ok(Some(part));
        }

        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };

        let part = source.next_part()?;
        if part.is_none() {
            trace!("part source exhausted");
            self.source = None;
        }
        Ok(part)
    }

    /// Stores `part` to be returned by the next [`Self::pull()`].
    ///
    /// Only one part can be pending.  Putting back a second one is a bug in the caller and fails
    /// with [`Error::PushbackOccupied`], dropping `part`.
    pub fn push_back(&mut self, part: Part) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::PushbackOccupied);
        }
        self.pending = Some(part);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True once the source is finished and nothing is pending.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_none() && self.pending.is_none()
    }
}

impl PartSource for Lookahead {
    fn next_part(&mut self) -> io::Result<Option<Part>> {
        self.pull()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use similar_asserts::assert_eq;

    use super::*;
    use crate::test::{file_part, VecSource};

    fn names(lookahead: &mut Lookahead) -> Vec<String> {
        let mut names = vec![];
        while let Some(part) = lookahead.pull().unwrap() {
            names.push(part.file_name().unwrap());
        }
        names
    }

    #[test]
    fn test_pull_in_order() {
        let mut lookahead = Lookahead::new(VecSource::new([
            file_part("a", "1"),
            file_part("b", "2"),
        ]));
        assert_eq!(names(&mut lookahead), vec!["a", "b"]);
        assert!(lookahead.is_exhausted());
    }

    #[test]
    fn test_push_back_returns_first() {
        let mut lookahead = Lookahead::new(VecSource::new([
            file_part("a", "1"),
            file_part("b", "2"),
        ]));
        let a = lookahead.pull().unwrap().unwrap();
        lookahead.push_back(a).unwrap();
        assert!(lookahead.has_pending());
        assert_eq!(names(&mut lookahead), vec!["a", "b"]);
    }

    #[test]
    fn test_push_back_twice_fails() {
        let mut lookahead = Lookahead::new(VecSource::new([
            file_part("a", "1"),
            file_part("b", "2"),
        ]));
        let a = lookahead.pull().unwrap().unwrap();
        let b = lookahead.pull().unwrap().unwrap();
        lookahead.push_back(b).unwrap();
        assert!(matches!(lookahead.push_back(a), Err(Error::PushbackOccupied)));

        // the first put-back part is still the one we get
        assert_eq!(names(&mut lookahead), vec!["b"]);
    }

    #[test]
    fn test_push_back_after_exhaustion() {
        let mut lookahead = Lookahead::new(VecSource::new([file_part("a", "1")]));
        let a = lookahead.pull().unwrap().unwrap();
        assert!(lookahead.pull().unwrap().is_none());
        lookahead.push_back(a).unwrap();
        assert!(!lookahead.is_exhausted());
        assert_eq!(names(&mut lookahead), vec!["a"]);
    }

    #[test]
    fn test_exhausted_source_not_polled_again() {
        struct CountingSource(Rc<Cell<usize>>);
        impl PartSource for CountingSource {
            fn next_part(&mut self) -> io::Result<Option<Part>> {
                self.0.set(self.0.get() + 1);
                Ok(None)
            }
        }

        let polls = Rc::new(Cell::new(0));
        let mut lookahead = Lookahead::new(CountingSource(Rc::clone(&polls)));
        for _ in 0..3 {
            assert!(lookahead.pull().unwrap().is_none());
        }
        assert_eq!(polls.get(), 1);
    }

    #[test]
    fn test_source_error_is_not_exhaustion() {
        struct BrokenSource;
        impl PartSource for BrokenSource {
            fn next_part(&mut self) -> io::Result<Option<Part>> {
                Err(io::ErrorKind::ConnectionReset.into())
            }
        }

        let mut lookahead = Lookahead::new(BrokenSource);
        assert_eq!(
            lookahead.pull().unwrap_err().kind(),
            io::ErrorKind::ConnectionReset
        );
        assert!(!lookahead.is_exhausted());
    }
}
