use proptest::prelude::*;
use streamer_worker::report::Reading;

/// User-channel stream ids (bit 11 clear)
pub fn user_stream_strategy() -> impl Strategy<Value = u16> {
    (0x5000u16..0x5800).prop_filter("user stream", |s| s & (1 << 11) == 0)
}

/// Strictly increasing incremental ids starting at `first`
pub fn incremental_ids_strategy(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    (1u32..1000, prop::collection::vec(1u32..5, 1..max_len)).prop_map(|(first, gaps)| {
        gaps.iter()
            .scan(first, |id, gap| {
                let current = *id;
                *id += gap;
                Some(current)
            })
            .collect()
    })
}

/// Readings with strictly increasing ids on user streams
pub fn readings_strategy(max_len: usize) -> impl Strategy<Value = Vec<Reading>> {
    incremental_ids_strategy(max_len).prop_flat_map(|ids| {
        let len = ids.len();
        (
            Just(ids),
            prop::collection::vec(user_stream_strategy(), len),
            prop::collection::vec(any::<u32>(), len),
        )
            .prop_map(|(ids, streams, values)| {
                ids.into_iter()
                    .zip(streams)
                    .zip(values)
                    .map(|((id, stream), value)| Reading {
                        stream,
                        reserved: 0,
                        id,
                        timestamp: id * 10,
                        value,
                    })
                    .collect()
            })
    })
}
