//! Snapshot fan-out to observers
//!
//! Listeners are called synchronously, in registration order, on the task that
//! publishes. A listener that panics is logged and skipped; the rest of the
//! broadcast still happens.

use std::panic::{ self, AssertUnwindSafe };
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError, Weak };

use crate::snapshot::PlaybackSnapshot;


type Callback = Arc<dyn Fn( &PlaybackSnapshot ) + Send + Sync>;
type Registry = Mutex<Vec<( u64, Callback )>>;


/// Publish/subscribe hub for playback snapshots.
#[derive( Clone, Default )]
pub struct ListenerBus {
    listeners: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}


/// Handle returned by [`ListenerBus::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Registry>,
}


impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }


    /// Registers a listener.
    pub fn subscribe<F>( &self, callback: F ) -> Subscription
    where
        F: Fn( &PlaybackSnapshot ) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add( 1, Ordering::Relaxed );
        lock( &self.listeners ).push(( id, Arc::new( callback ) ));

        Subscription {
            id,
            listeners: Arc::downgrade( &self.listeners ),
        }
    }


    /// Delivers `snapshot` to every listener.
    pub fn publish( &self, snapshot: &PlaybackSnapshot ) {
        // Copy the list so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<( u64, Callback )> = lock( &self.listeners ).clone();

        for ( id, callback ) in listeners {
            let result = panic::catch_unwind( AssertUnwindSafe( || callback( snapshot ) ) );
            if result.is_err() {
                tracing::error!( "Listener {} panicked during publish", id );
            }
        }
    }


    /// Number of registered listeners.
    pub fn len( &self ) -> usize {
        lock( &self.listeners ).len()
    }


    pub fn is_empty( &self ) -> bool {
        self.len() == 0
    }
}


impl Subscription {
    /// Removes the listener. A no-op if the bus is gone.
    pub fn unsubscribe( self ) {
        if let Some( listeners ) = self.listeners.upgrade() {
            lock( &listeners ).retain( |( id, _ )| *id != self.id );
        }
    }
}


fn lock( registry: &Registry ) -> MutexGuard<'_, Vec<( u64, Callback )>> {
    registry.lock().unwrap_or_else( PoisonError::into_inner )
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotParts;


    fn snapshot( progress_ms: u64 ) -> PlaybackSnapshot {
        PlaybackSnapshot::new( SnapshotParts { progress_ms, ..SnapshotParts::default() } )
    }


    #[test]
    fn test_delivers_in_registration_order() {
        let bus = ListenerBus::new();
        let seen = Arc::new( Mutex::new( Vec::new() ) );

        for name in [ "first", "second", "third" ] {
            let seen = Arc::clone( &seen );
            let _ = bus.subscribe( move |_| seen.lock().unwrap().push( name ) );
        }

        bus.publish( &snapshot( 0 ) );
        assert_eq!( *seen.lock().unwrap(), vec![ "first", "second", "third" ] );
    }


    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = ListenerBus::new();
        let count = Arc::new( AtomicU64::new( 0 ) );

        let counter = Arc::clone( &count );
        let sub = bus.subscribe( move |_| { counter.fetch_add( 1, Ordering::SeqCst ); } );

        bus.publish( &snapshot( 0 ) );
        sub.unsubscribe();
        bus.publish( &snapshot( 0 ) );

        assert_eq!( count.load( Ordering::SeqCst ), 1 );
        assert!( bus.is_empty() );
    }


    #[test]
    fn test_dropped_subscription_stays_registered() {
        let bus = ListenerBus::new();
        let count = Arc::new( AtomicU64::new( 0 ) );

        let counter = Arc::clone( &count );
        drop( bus.subscribe( move |_| { counter.fetch_add( 1, Ordering::SeqCst ); } ) );

        bus.publish( &snapshot( 0 ) );
        assert_eq!( count.load( Ordering::SeqCst ), 1 );
        assert_eq!( bus.len(), 1 );
    }


    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = ListenerBus::new();
        let last = Arc::new( AtomicU64::new( 0 ) );

        let _ = bus.subscribe( |_| panic!( "listener bug" ) );
        let after = Arc::clone( &last );
        let _ = bus.subscribe( move |s| after.store( s.progress_ms, Ordering::SeqCst ) );

        bus.publish( &snapshot( 4200 ) );
        assert_eq!( last.load( Ordering::SeqCst ), 4200 );
    }


    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = ListenerBus::new();
        let sub = bus.subscribe( |_| {} );
        drop( bus );
        sub.unsubscribe();
    }
}
