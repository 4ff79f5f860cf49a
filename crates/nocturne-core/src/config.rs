//! Engine tunables

use std::time::Duration;

use serde::{ Deserialize, Serialize };

use crate::history::DEFAULT_HISTORY_LIMIT;


/// Timing and sizing knobs for [`crate::PlaybackEngine`].
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct EngineConfig {
    /// Trailing part of a track during which the next one fades in.
    pub crossfade_window_ms: u64,

    /// Number of volume steps in a crossfade.
    pub crossfade_steps: u32,

    /// Delay between detecting the window and starting the crossfade.
    pub crossfade_debounce_ms: u64,

    /// Delay before the single automatic retry of a failed load.
    pub retry_delay_ms: u64,

    /// Past this position `prev` restarts the current track.
    pub restart_threshold_ms: u64,

    /// Maximum history entries.
    pub history_limit: usize,

    /// Minimum spacing between position saves driven by status ticks.
    pub position_save_interval_ms: u64,
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade_window_ms: 3000,
            crossfade_steps: 10,
            crossfade_debounce_ms: 100,
            retry_delay_ms: 1000,
            restart_threshold_ms: 3000,
            history_limit: DEFAULT_HISTORY_LIMIT,
            position_save_interval_ms: 5000,
        }
    }
}


impl EngineConfig {
    pub fn crossfade_window( &self ) -> Duration {
        Duration::from_millis( self.crossfade_window_ms )
    }


    /// Time between two crossfade volume steps.
    pub fn crossfade_step( &self ) -> Duration {
        Duration::from_millis( self.crossfade_window_ms / u64::from( self.crossfade_steps.max( 1 ) ) )
    }


    pub fn crossfade_debounce( &self ) -> Duration {
        Duration::from_millis( self.crossfade_debounce_ms )
    }


    pub fn retry_delay( &self ) -> Duration {
        Duration::from_millis( self.retry_delay_ms )
    }


    pub fn position_save_interval( &self ) -> Duration {
        Duration::from_millis( self.position_save_interval_ms )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!( config.crossfade_step(), Duration::from_millis( 300 ) );
        assert_eq!( config.retry_delay(), Duration::from_secs( 1 ) );
        assert_eq!( config.history_limit, 50 );
    }


    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str( r#"{ "crossfade_window_ms": 6000 }"# ).unwrap();
        assert_eq!( config.crossfade_window_ms, 6000 );
        assert_eq!( config.crossfade_steps, 10 );
        assert_eq!( config.crossfade_step(), Duration::from_millis( 600 ) );
    }


    #[test]
    fn test_zero_steps_does_not_divide_by_zero() {
        let config = EngineConfig { crossfade_steps: 0, ..EngineConfig::default() };
        assert_eq!( config.crossfade_step(), Duration::from_millis( 3000 ) );
    }
}
