use std::num::NonZeroUsize;

/// Notion accepts at most this many children per append request.
pub const MAX_BLOCKS_PER_APPEND: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// Splits `items` into ordered runs of `size`, the last one possibly shorter.
pub fn chunk<T>(items: &[T], size: NonZeroUsize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.get())
}
