// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a failed flow under `oauth2_session_flow_errors_total`, labeled by
/// [`Error::kind`].
pub fn record_flow_error(kind: FlowKind, error: &Error) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_session_flow_errors_total",
			"flow" => kind.as_str(),
			"error_kind" => error.kind()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, error);
	}
}
