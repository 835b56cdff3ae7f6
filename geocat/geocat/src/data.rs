//! Partition payload fetching.

use crate::cancellation::CancellationContext;
use crate::error::{Error, Result};
use crate::metadata::Repository;
use crate::types::DataRequest;

/// Download the payload a [`DataRequest`] names.
///
/// A request by partition id first resolves the data handle through the
/// query service, at the pinned or latest version for versioned layers.
pub(crate) async fn fetch_data(
    repository: &Repository,
    request: &DataRequest,
    context: &CancellationContext,
) -> Result<Vec<u8>> {
    if request.data_handle.is_none() && request.partition_id.is_none() {
        return Err(missing_address());
    }

    let option = request.fetch_option;
    let layer = repository
        .readable_layer(&request.layer_id, option, context)
        .await?;

    let data_handle = match (&request.data_handle, &request.partition_id) {
        (Some(data_handle), _) => data_handle.clone(),
        (None, Some(partition_id)) => {
            let version = if layer.is_versioned() {
                Some(
                    repository
                        .version_or_latest(request.version, option, context)
                        .await?,
                )
            } else {
                None
            };
            repository
                .partition(&request.layer_id, partition_id, layer, version, option, context)
                .await?
                .data_handle
        }
        (None, None) => return Err(missing_address()),
    };

    tracing::debug!(layer_id = request.layer_id, data_handle, "fetching partition data");
    repository
        .blob(&request.layer_id, &data_handle, layer, option, context)
        .await
}

fn missing_address() -> Error {
    Error::invalid_argument("a data request needs a partition id or a data handle")
}
