//! Property tests for queue and history invariants.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nocturne_core::{ History, PlayQueue, RepeatMode, Track };


fn tracks( count: usize ) -> Vec<Track> {
    ( 0..count ).map( |i| Track::new( format!( "t{i}" ), format!( "file:///t{i}.mp3" ) ) ).collect()
}


fn sorted_ids( tracks: &[Track] ) -> Vec<String> {
    let mut ids: Vec<_> = tracks.iter().map( |t| t.id.clone() ).collect();
    ids.sort();
    ids
}


#[derive( Debug, Clone )]
enum Op {
    Add,
    Remove( usize ),
    Jump( usize ),
    Shuffle( u64 ),
    Repeat,
    Clear,
}


fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just( Op::Add ),
        3 => ( 0usize..20 ).prop_map( Op::Remove ),
        2 => ( 0usize..20 ).prop_map( Op::Jump ),
        1 => any::<u64>().prop_map( Op::Shuffle ),
        1 => Just( Op::Repeat ),
        1 => Just( Op::Clear ),
    ]
}


proptest! {
    /// The pointer is always in range, or absent exactly when the queue is empty.
    #[test]
    fn pointer_stays_in_range( initial in 0usize..10, start in 0usize..12, ops in prop::collection::vec( op(), 0..40 ) ) {
        let mut queue = PlayQueue::default();
        queue.set_queue( tracks( initial ), start );
        let mut added = initial;

        for op in ops {
            match op {
                Op::Add => {
                    queue.add( Track::new( format!( "n{added}" ), "x" ) );
                    added += 1;
                }
                Op::Remove( i ) => { queue.remove( i ); }
                Op::Jump( i ) => { queue.jump_to( i ); }
                Op::Shuffle( seed ) => { queue.toggle_shuffle_with( &mut StdRng::seed_from_u64( seed ) ); }
                Op::Repeat => { queue.toggle_repeat(); }
                Op::Clear => queue.clear(),
            }

            match queue.current_index() {
                Some( i ) => prop_assert!( i < queue.len() ),
                None => prop_assert!( queue.is_empty() ),
            }
        }
    }


    /// Shuffling permutes the queue and keeps the current track current.
    #[test]
    fn shuffle_is_a_permutation( count in 2usize..40, current in 0usize..40, seed in any::<u64>() ) {
        let current = current % count;
        let mut queue = PlayQueue::default();
        queue.set_queue( tracks( count ), current );
        let before = queue.tracks().to_vec();
        let current_id = queue.current().unwrap().id.clone();

        prop_assert!( queue.toggle_shuffle_with( &mut StdRng::seed_from_u64( seed ) ) );
        prop_assert_eq!( sorted_ids( queue.tracks() ), sorted_ids( &before ) );
        prop_assert_eq!( &queue.current().unwrap().id, &current_id );

        let after = queue.tracks().to_vec();
        prop_assert!( !queue.toggle_shuffle_with( &mut StdRng::seed_from_u64( seed ) ) );
        prop_assert_eq!( sorted_ids( queue.tracks() ), sorted_ids( &after ) );
        prop_assert_eq!( queue.tracks().iter().map( |t| &t.id ).collect::<Vec<_>>(), after.iter().map( |t| &t.id ).collect::<Vec<_>>() );
    }


    /// History never exceeds its limit, holds no duplicate ids and keeps the
    /// latest play at the front.
    #[test]
    fn history_is_bounded_and_unique( plays in prop::collection::vec( 0usize..30, 1..200 ), limit in 1usize..60 ) {
        let mut history = History::new( limit );
        for &id in &plays {
            history.push( Track::new( format!( "t{id}" ), "x" ) );
        }

        prop_assert!( history.len() <= limit );
        let ids = sorted_ids( &history.to_vec() );
        let mut unique = ids.clone();
        unique.dedup();
        prop_assert_eq!( ids.len(), unique.len() );

        let last = format!( "t{}", plays[plays.len() - 1] );
        prop_assert_eq!( &history.latest().unwrap().id, &last );
    }


    /// next() visits every track before wrapping with RepeatMode::All and
    /// stops at the end with RepeatMode::Off.
    #[test]
    fn next_walks_the_queue( count in 1usize..20, repeat_all in any::<bool>() ) {
        let mut queue = PlayQueue::default();
        queue.set_queue( tracks( count ), 0 );
        if repeat_all {
            queue.set_repeat( RepeatMode::All );
        }

        let mut visited = vec![0];
        while let Some( next ) = queue.peek_next() {
            if next == 0 {
                break;
            }
            queue.jump_to( next );
            visited.push( next );
        }

        prop_assert_eq!( visited, ( 0..count ).collect::<Vec<_>>() );
        prop_assert_eq!( queue.peek_next(), if repeat_all { Some( 0 ) } else { None } );
    }
}


#[test]
fn test_repeat_cycles_back_to_off() {
    let mut queue = PlayQueue::default();
    assert_eq!( queue.toggle_repeat(), RepeatMode::One );
    assert_eq!( queue.toggle_repeat(), RepeatMode::All );
    assert_eq!( queue.toggle_repeat(), RepeatMode::Off );
}
