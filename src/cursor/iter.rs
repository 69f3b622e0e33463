//! Pull-based iteration over a cursor
//!
//! Both iterators are lazy: nothing is fetched until `next` is called.
//! They end once the cursor is exhausted and stop for good after the
//! first error. A cursor that failed can still be driven by hand with
//! `next_page`, or reset and iterated again.

use std::vec;

use serde_json::Value;

use super::cursor::KeysetCursor;
use super::errors::CursorResult;
use super::state::CursorPhase;
use crate::compiler::QueryCompiler;
use crate::schema::ClassRegistry;
use crate::transport::DocumentStore;

/// Iterator over pages
pub struct Pages<'c, 'q, R: ClassRegistry, S: DocumentStore + ?Sized> {
    cursor: &'c mut KeysetCursor,
    compiler: &'c QueryCompiler<'q, R>,
    store: &'c S,
    failed: bool,
}

impl<'c, 'q, R: ClassRegistry, S: DocumentStore + ?Sized> Iterator for Pages<'c, 'q, R, S> {
    type Item = CursorResult<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.phase() == CursorPhase::Exhausted {
            return None;
        }
        match self.cursor.next_page(self.compiler, self.store) {
            Ok(page) if page.is_empty() => None,
            Ok(page) => Some(Ok(page)),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterator over individual documents, page by page
pub struct Documents<'c, 'q, R: ClassRegistry, S: DocumentStore + ?Sized> {
    pages: Pages<'c, 'q, R, S>,
    buffered: vec::IntoIter<Value>,
}

impl<'c, 'q, R: ClassRegistry, S: DocumentStore + ?Sized> Iterator for Documents<'c, 'q, R, S> {
    type Item = CursorResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.buffered.next() {
                return Some(Ok(doc));
            }
            match self.pages.next()? {
                Ok(page) => self.buffered = page.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl KeysetCursor {
    /// Pages from the current position to the end
    pub fn pages<'c, 'q, R, S>(
        &'c mut self,
        compiler: &'c QueryCompiler<'q, R>,
        store: &'c S,
    ) -> Pages<'c, 'q, R, S>
    where
        R: ClassRegistry,
        S: DocumentStore + ?Sized,
    {
        Pages {
            cursor: self,
            compiler,
            store,
            failed: false,
        }
    }

    /// Documents from the current position to the end
    pub fn documents<'c, 'q, R, S>(
        &'c mut self,
        compiler: &'c QueryCompiler<'q, R>,
        store: &'c S,
    ) -> Documents<'c, 'q, R, S>
    where
        R: ClassRegistry,
        S: DocumentStore + ?Sized,
    {
        Documents {
            pages: self.pages(compiler, store),
            buffered: Vec::new().into_iter(),
        }
    }
}
