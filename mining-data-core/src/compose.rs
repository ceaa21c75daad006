//! Multi-source composition
//!
//! [`VerticalComposer`] concatenates the attributes of members that cover the
//! same rows. [`HorizontalComposer`] chains the rows of members that share one
//! attribute space. Both drive their members sequentially in member order
//! and share a single [`EncoderHandle`] between them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cursor::StreamCursor;
use crate::encoder::EncoderHandle;
use crate::error::{Error, Result};
use crate::schema::AttributeCatalog;
use crate::stream::MiningStream;
use crate::vector::MiningVector;

/// Open every member in order; on failure close the ones already opened
fn open_all(members: &mut [StreamCursor]) -> Result<()> {
    for i in 0..members.len() {
        if let Err(err) = members[i].open() {
            for opened in &mut members[..i] {
                if let Err(close_err) = opened.close() {
                    warn!(origin = opened.origin(), error = %close_err, "close after failed open");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Close every member, reporting the first failure
fn close_all(members: &mut [StreamCursor]) -> Result<()> {
    let mut first_err = None;
    for member in members.iter_mut() {
        if let Err(err) = member.close() {
            warn!(origin = member.origin(), error = %err, "member close failed");
            first_err.get_or_insert(err);
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// Reset every member in order; on failure close them all
fn reset_all(members: &mut [StreamCursor]) -> Result<()> {
    let result = members.iter_mut().try_for_each(|member| member.reset());
    if let Err(err) = result {
        if let Err(close_err) = close_all(members) {
            warn!(error = %close_err, "close after failed reset");
        }
        return Err(err);
    }
    Ok(())
}

fn share_encoder(members: &mut [StreamCursor], encoder: &EncoderHandle) {
    for member in members.iter_mut() {
        member.set_encoder(encoder.clone());
    }
}

fn require_members(members: &[StreamCursor]) -> Result<()> {
    if members.is_empty() {
        Err(Error::InvalidArgument("composition needs at least one member".into()))
    } else {
        Ok(())
    }
}

/// Attribute concatenation over members with equal row counts
///
/// Row `i` of the composed stream is the concatenation of row `i` of every
/// member, in member order.
#[derive(Debug)]
pub struct VerticalComposer {
    members: Vec<StreamCursor>,
    encoder: EncoderHandle,
    catalog: Arc<AttributeCatalog>,
    open: bool,
    position: usize,
    current: Option<MiningVector>,
}

impl VerticalComposer {
    /// Compose members with a fresh shared encoder
    pub fn new(members: Vec<StreamCursor>) -> Result<Self> {
        Self::with_encoder(members, EncoderHandle::new())
    }

    /// Compose members around a caller-supplied shared encoder
    ///
    /// Every member must report the same total record count; otherwise the
    /// composition fails with [`Error::RowCountMismatch`]. Members are
    /// closed again once the checks pass.
    pub fn with_encoder(mut members: Vec<StreamCursor>, encoder: EncoderHandle) -> Result<Self> {
        require_members(&members)?;
        share_encoder(&mut members, &encoder);

        let expected = members[0].total_record_count()?;
        for (member, cursor) in members.iter_mut().enumerate().skip(1) {
            let found = cursor.total_record_count()?;
            if found != expected {
                return Err(Error::RowCountMismatch { member, expected, found });
            }
        }

        let catalogs = members
            .iter_mut()
            .map(|member| member.catalog())
            .collect::<Result<Vec<_>>>()?;
        let catalog = AttributeCatalog::concat(catalogs.iter().map(|catalog| &**catalog));

        close_all(&mut members)?;
        debug!(members = members.len(), attributes = catalog.len(), rows = expected, "vertical composition");

        Ok(Self {
            members,
            encoder,
            catalog: Arc::new(catalog),
            open: false,
            position: 0,
            current: None,
        })
    }

    /// Member cursors in order
    pub fn members(&self) -> &[StreamCursor] {
        &self.members
    }

    /// The encoder shared by every member
    pub fn encoder(&self) -> &EncoderHandle {
        &self.encoder
    }

    /// A closed composer over duplicated members, reusing the composed catalog
    pub fn duplicate(&self) -> Result<Self> {
        let members = self
            .members
            .iter()
            .map(StreamCursor::duplicate)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            members,
            encoder: self.encoder.clone(),
            catalog: Arc::clone(&self.catalog),
            open: false,
            position: 0,
            current: None,
        })
    }

    fn assemble(&self, parts: Vec<Option<MiningVector>>, index: usize) -> Result<Option<MiningVector>> {
        if parts.iter().all(Option::is_none) {
            return Ok(None);
        }

        let mut values = Vec::with_capacity(self.catalog.len());
        for (member, part) in parts.into_iter().enumerate() {
            match part {
                Some(vector) => values.extend_from_slice(vector.values()),
                None => {
                    return Err(Error::RowCountMismatch {
                        member,
                        expected: index,
                        found: self.members[member].position(),
                    })
                }
            }
        }

        Ok(Some(MiningVector::new(values, index, self.catalog.logical().clone())))
    }

    /// Move the first `advanced` members back to `self.position`
    fn realign(&mut self, advanced: usize) -> Result<()> {
        let position = self.position;
        for member in &mut self.members[..advanced] {
            if position == 0 {
                member.reset()?;
            } else {
                member.record_at(position)?;
            }
        }
        Ok(())
    }
}

impl MiningStream for VerticalComposer {
    fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        share_encoder(&mut self.members, &self.encoder);
        open_all(&mut self.members)?;
        self.open = true;
        self.position = 0;
        self.current = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.position = 0;
        self.current = None;
        close_all(&mut self.members)
    }

    fn reset(&mut self) -> Result<()> {
        self.open()?;
        if let Err(err) = reset_all(&mut self.members) {
            self.open = false;
            self.position = 0;
            self.current = None;
            return Err(err);
        }
        self.position = 0;
        self.current = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn position(&self) -> usize {
        self.position
    }

    fn current_vector(&self) -> Option<MiningVector> {
        self.current.clone()
    }

    fn catalog(&mut self) -> Result<Arc<AttributeCatalog>> {
        Ok(Arc::clone(&self.catalog))
    }

    fn next_vector(&mut self) -> Result<Option<MiningVector>> {
        self.open()?;

        let mut parts = Vec::with_capacity(self.members.len());
        for i in 0..self.members.len() {
            match self.members[i].next_vector() {
                Ok(part) => parts.push(part),
                Err(err) => {
                    if let Err(realign_err) = self.realign(i) {
                        warn!(error = %realign_err, "members left out of step after failed read");
                    }
                    return Err(err);
                }
            }
        }

        let vector = self.assemble(parts, self.position + 1)?;
        if let Some(vector) = &vector {
            self.position = vector.index();
            self.current = Some(vector.clone());
        }
        Ok(vector)
    }

    fn record_at(&mut self, target: usize) -> Result<Option<MiningVector>> {
        self.open()?;
        if target == 0 {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(self.members.len());
        for i in 0..self.members.len() {
            match self.members[i].record_at(target) {
                Ok(part) => parts.push(part),
                Err(err) => {
                    if let Err(realign_err) = self.realign(i + 1) {
                        warn!(error = %realign_err, "members left out of step after failed seek");
                    }
                    return Err(err);
                }
            }
        }

        let vector = self.assemble(parts, target)?;
        match &vector {
            Some(vector) => {
                self.position = target;
                self.current = Some(vector.clone());
            }
            None => {
                // Every member ran out at the same row
                self.position = self.members[0].position();
                self.current = None;
            }
        }
        Ok(vector)
    }

    fn total_record_count(&mut self) -> Result<usize> {
        self.open()?;
        let expected = self.members[0].total_record_count()?;
        for (member, cursor) in self.members.iter_mut().enumerate().skip(1) {
            let found = cursor.total_record_count()?;
            if found != expected {
                return Err(Error::RowCountMismatch { member, expected, found });
            }
        }
        Ok(expected)
    }
}

/// Row concatenation over members with identical schemas
///
/// Rows are chained in member order and renumbered continuously.
#[derive(Debug)]
pub struct HorizontalComposer {
    members: Vec<StreamCursor>,
    encoder: EncoderHandle,
    catalog: Arc<AttributeCatalog>,
    open: bool,
    active: usize,
    position: usize,
    current: Option<MiningVector>,
}

impl HorizontalComposer {
    /// Compose members with a fresh shared encoder
    pub fn new(members: Vec<StreamCursor>) -> Result<Self> {
        Self::with_encoder(members, EncoderHandle::new())
    }

    /// Compose members around a caller-supplied shared encoder
    ///
    /// Every member must expose the same attribute names in the same order;
    /// otherwise the composition fails with [`Error::SchemaMismatch`].
    pub fn with_encoder(mut members: Vec<StreamCursor>, encoder: EncoderHandle) -> Result<Self> {
        require_members(&members)?;
        share_encoder(&mut members, &encoder);

        let catalog = members[0].catalog()?;
        for member in members.iter_mut().skip(1) {
            catalog.ensure_same_layout(&*member.catalog()?)?;
        }

        close_all(&mut members)?;
        debug!(members = members.len(), attributes = catalog.len(), "horizontal composition");

        Ok(Self {
            members,
            encoder,
            catalog,
            open: false,
            active: 0,
            position: 0,
            current: None,
        })
    }

    /// Member cursors in order
    pub fn members(&self) -> &[StreamCursor] {
        &self.members
    }

    /// The encoder shared by every member
    pub fn encoder(&self) -> &EncoderHandle {
        &self.encoder
    }

    /// A closed composer over duplicated members, reusing the catalog
    pub fn duplicate(&self) -> Result<Self> {
        let members = self
            .members
            .iter()
            .map(StreamCursor::duplicate)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            members,
            encoder: self.encoder.clone(),
            catalog: Arc::clone(&self.catalog),
            open: false,
            active: 0,
            position: 0,
            current: None,
        })
    }
}

impl MiningStream for HorizontalComposer {
    fn open(&mut self) -> Result<()> {
        if self.open {
            return Ok(());
        }
        share_encoder(&mut self.members, &self.encoder);
        open_all(&mut self.members)?;
        self.open = true;
        self.active = 0;
        self.position = 0;
        self.current = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.active = 0;
        self.position = 0;
        self.current = None;
        close_all(&mut self.members)
    }

    fn reset(&mut self) -> Result<()> {
        self.open()?;
        if let Err(err) = reset_all(&mut self.members) {
            self.open = false;
            self.active = 0;
            self.position = 0;
            self.current = None;
            return Err(err);
        }
        self.active = 0;
        self.position = 0;
        self.current = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn position(&self) -> usize {
        self.position
    }

    fn current_vector(&self) -> Option<MiningVector> {
        self.current.clone()
    }

    fn catalog(&mut self) -> Result<Arc<AttributeCatalog>> {
        Ok(Arc::clone(&self.catalog))
    }

    fn next_vector(&mut self) -> Result<Option<MiningVector>> {
        self.open()?;

        while self.active < self.members.len() {
            if let Some(vector) = self.members[self.active].next_vector()? {
                self.position += 1;
                let vector = vector.renumbered(self.position, self.catalog.logical().clone());
                self.current = Some(vector.clone());
                return Ok(Some(vector));
            }
            self.active += 1;
        }

        Ok(None)
    }

    fn total_record_count(&mut self) -> Result<usize> {
        self.open()?;
        let mut total = 0;
        for member in &mut self.members {
            total += member.total_record_count()?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, PhysicalRecordSource, RawField, RawRow};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    /// Memory source whose reads fail while `failures` is positive
    struct Flaky {
        inner: MemorySource,
        failures: Arc<AtomicUsize>,
    }

    impl PhysicalRecordSource for Flaky {
        fn origin(&self) -> &str {
            self.inner.origin()
        }

        fn open(&mut self) -> Result<()> {
            self.inner.open()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }

        fn rewind(&mut self) -> Result<()> {
            self.inner.rewind()
        }

        fn has_header(&self) -> bool {
            self.inner.has_header()
        }

        fn peek_schema_row(&mut self) -> Result<Option<RawRow>> {
            self.inner.peek_schema_row()
        }

        fn read_next(&mut self) -> Result<Option<RawRow>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::read(self.inner.origin(), "transient failure"));
            }
            self.inner.read_next()
        }

        fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>> {
            self.inner.duplicate()
        }
    }

    fn member(name: &str, header: &[&str], rows: &[&[&str]]) -> StreamCursor {
        StreamCursor::new(Box::new(MemorySource::from_tokens(name, Some(header), rows)))
    }

    fn sized(name: &str, rows: usize) -> StreamCursor {
        let rows: Vec<RawRow> = (0..rows).map(|i| vec![RawField::Number(i as f64)]).collect();
        StreamCursor::new(Box::new(MemorySource::with_header(name, [name], rows)))
    }

    fn pair() -> (StreamCursor, StreamCursor) {
        (
            member("left", &["a", "b"], &[&["1", "x"], &["2", "y"], &["3", "x"]]),
            member("right", &["c", "d"], &[&["y", "10"], &["x", "20"], &["z", "30"]]),
        )
    }

    #[test_case(&[100, 100, 100], None ; "equal counts compose")]
    #[test_case(&[100, 99, 100], Some((1, 100, 99)) ; "short member is rejected")]
    #[test_case(&[5, 5, 6], Some((2, 5, 6)) ; "long member is rejected")]
    fn test_vertical_row_counts(counts: &[usize], mismatch: Option<(usize, usize, usize)>) {
        let members = counts
            .iter()
            .enumerate()
            .map(|(i, &rows)| sized(&format!("m{i}"), rows))
            .collect();

        match (VerticalComposer::new(members), mismatch) {
            (Ok(mut composer), None) => {
                assert_eq!(composer.total_record_count().unwrap(), counts[0]);
                assert_eq!(composer.catalog().unwrap().len(), counts.len());
            }
            (Err(Error::RowCountMismatch { member, expected, found }), Some(want)) => {
                assert_eq!((member, expected, found), want);
            }
            (other, _) => panic!("unexpected composition result: {other:?}"),
        }
    }

    #[test]
    fn test_vertical_concatenates_rows() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();
        assert!(!composer.is_open());

        let first = composer.next_vector().unwrap().unwrap();
        assert_eq!(first.index(), 1);
        assert_eq!(first.values(), &[1.0, 1.0, 1.0, 10.0]);

        let second = composer.next_vector().unwrap().unwrap();
        assert_eq!(second.values(), &[2.0, 2.0, 2.0, 20.0]);
        assert_eq!(second.value_by_name("d"), Some(20.0));

        assert_eq!(composer.next_vector().unwrap().unwrap().values(), &[3.0, 1.0, 3.0, 30.0]);
        assert!(composer.next_vector().unwrap().is_none());
    }

    #[test]
    fn test_vertical_shares_codes_across_members() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();

        let rows: Vec<_> = composer.vectors().collect::<Result<_>>().unwrap();

        // Column 1 of `left` and column 0 of `right` are different slots,
        // but every member encodes through the same tables.
        assert!(composer.members().iter().all(|m| m.encoder().shares_with(composer.encoder())));
        assert_eq!(rows[0].value(1), Some(1.0));
        assert_eq!(rows[0].value(2), Some(1.0));
        assert_eq!(rows[1].value(2), Some(2.0));
    }

    #[test]
    fn test_vertical_same_column_same_code() {
        let left = member("left", &["k"], &[&["alpha"], &["beta"]]);
        let right = member("right", &["k"], &[&["beta"], &["alpha"]]);
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();

        let first = composer.next_vector().unwrap().unwrap();
        let second = composer.next_vector().unwrap().unwrap();

        assert_eq!(first.values(), &[1.0, 2.0]);
        assert_eq!(second.values(), &[2.0, 1.0]);
    }

    #[test]
    fn test_vertical_record_at() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();

        let third = composer.record_at(3).unwrap().unwrap();
        let first = composer.record_at(1).unwrap().unwrap();

        assert_eq!(third.index(), 3);
        assert_eq!(third.len(), 4);
        assert_eq!(first.values()[0], 1.0);
        assert_eq!(composer.position(), 1);
        assert!(composer.record_at(4).unwrap().is_none());
    }

    #[test]
    fn test_vertical_seek_past_end_tracks_members() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();

        composer.record_at(2).unwrap();
        assert!(composer.record_at(5).unwrap().is_none());
        assert_eq!(composer.position(), 3);
        assert!(composer.members().iter().all(|m| m.position() == 3));
        assert!(composer.next_vector().unwrap().is_none());

        let last = composer.record_at(3).unwrap().unwrap();
        assert_eq!(last.index(), 3);
        assert_eq!(last.values(), &[3.0, 1.0, 3.0, 30.0]);
    }

    #[test]
    fn test_vertical_failed_seek_realigns_members() {
        let failures = Arc::new(AtomicUsize::new(0));
        let left = member("left", &["a"], &[&["1"], &["2"], &["3"]]);
        let flaky = Flaky {
            inner: MemorySource::from_tokens("right", Some(&["b"]), &[&["10"], &["20"], &["30"]]),
            failures: failures.clone(),
        };
        let right = StreamCursor::new(Box::new(flaky));
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();

        composer.next_vector().unwrap();
        failures.store(1, Ordering::SeqCst);
        assert!(composer.record_at(3).unwrap_err().is_recoverable());

        assert_eq!(composer.position(), 1);
        assert!(composer.members().iter().all(|m| m.position() == 1));
        let second = composer.next_vector().unwrap().unwrap();
        assert_eq!(second.index(), 2);
        assert_eq!(second.values(), &[2.0, 20.0]);
    }

    #[test]
    fn test_vertical_schema_is_concatenated() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();
        let catalog = composer.catalog().unwrap();

        let names: Vec<_> = catalog.logical().attributes().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(catalog.physical().len(), 4);
    }

    #[test]
    fn test_vertical_lifecycle_fans_out() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();
        assert!(composer.members().iter().all(|m| !m.is_open()));

        composer.open().unwrap();
        assert!(composer.members().iter().all(StreamCursor::is_open));

        composer.next_vector().unwrap();
        composer.reset().unwrap();
        assert!(composer.members().iter().all(|m| m.position() == 0));

        composer.close().unwrap();
        assert!(composer.members().iter().all(|m| !m.is_open()));
    }

    #[test]
    fn test_empty_composition_rejected() {
        assert!(matches!(VerticalComposer::new(vec![]), Err(Error::InvalidArgument(_))));
        assert!(matches!(HorizontalComposer::new(vec![]), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_vertical_duplicate() {
        let (left, right) = pair();
        let mut composer = VerticalComposer::new(vec![left, right]).unwrap();
        composer.record_at(2).unwrap();

        let mut copy = composer.duplicate().unwrap();
        assert!(!copy.is_open());
        assert!(Arc::ptr_eq(&copy.catalog().unwrap(), &composer.catalog().unwrap()));
        assert!(copy.members().iter().all(|m| m.known_catalog().is_some()));

        assert_eq!(copy.next_vector().unwrap().unwrap().index(), 1);
        assert_eq!(composer.position(), 2);
    }

    #[test]
    fn test_horizontal_chains_rows() {
        let first = member("first", &["k", "v"], &[&["a", "1"], &["b", "2"]]);
        let second = member("second", &["k", "v"], &[&["b", "3"]]);
        let mut composer = HorizontalComposer::new(vec![first, second]).unwrap();

        let rows: Vec<_> = composer.vectors().collect::<Result<_>>().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().map(MiningVector::index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rows[2].values(), &[2.0, 3.0]);
        assert_eq!(composer.total_record_count().unwrap(), 3);
        assert_eq!(composer.position(), 3);
    }

    #[test]
    fn test_horizontal_seek_across_members() {
        let first = member("first", &["v"], &[&["1"], &["2"]]);
        let second = member("second", &["v"], &[&["3"], &["4"]]);
        let mut composer = HorizontalComposer::new(vec![first, second]).unwrap();

        assert_eq!(composer.record_at(4).unwrap().unwrap().values(), &[4.0]);
        assert_eq!(composer.record_at(2).unwrap().unwrap().values(), &[2.0]);
        assert_eq!(composer.record_at(3).unwrap().unwrap().index(), 3);
        assert!(composer.record_at(5).unwrap().is_none());
    }

    #[test]
    fn test_horizontal_schema_mismatch() {
        let first = member("first", &["k", "v"], &[&["a", "1"]]);
        let renamed = member("second", &["k", "w"], &[&["a", "1"]]);

        assert!(matches!(
            HorizontalComposer::new(vec![first, renamed]),
            Err(Error::SchemaMismatch(_))
        ));

        let first = member("first", &["k", "v"], &[&["a", "1"]]);
        let narrow = member("second", &["k"], &[&["a"]]);
        assert!(matches!(
            HorizontalComposer::new(vec![first, narrow]),
            Err(Error::SchemaMismatch(_))
        ));
    }
}
