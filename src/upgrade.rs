//! Firmware upgrade state machine: upload an image, let the device swap and
//! reboot, then confirm the new image.
//!
//! [`upgrade_firmware`] drives the whole sequence in a background task and
//! streams `(bytes_uploaded, total_bytes)` progress back to the caller.
//! [`firmware_update`] wraps it with the convenience behavior the rest of
//! the crate's CLI-shaped callers expect: skip the upload entirely if the
//! image is already active.

use std::time::Duration;

use miette::Diagnostic;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::client::SmpClient;
use crate::commands::image::{self, ImageUpload, ImageUploadResponse};
use crate::connection::ExecuteError;
use crate::mcuboot::{self, ImageParseError};
use crate::smp_errors::{DeviceError, MCUmgrErr};

const PROGRESS_QUEUE_DEPTH: usize = 16;
const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_RECONNECT_DEADLINE: Duration = Duration::from_secs(60);

/// Which phase of the upgrade a [`UpgradeProgress`] event was reported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    /// Reading the device's current image state and upload chunk size.
    ProbingMtu,
    /// Writing image chunks.
    Uploading,
    /// Marking the new image for test boot and resetting the device.
    WaitingSwap,
    /// Waiting for the device to come back up after the reset.
    Reconnecting,
    /// Reading the post-reboot image state and confirming the new image.
    Confirming,
    /// The upgrade finished successfully.
    Done,
}

/// One progress update emitted while an upgrade runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeProgress {
    /// The phase this update was reported from.
    pub phase: UpgradePhase,
    /// Bytes of the image uploaded so far. `0` outside the uploading phase.
    pub bytes_uploaded: u64,
    /// Total size of the image being uploaded.
    pub total_bytes: u64,
}

/// Parameters controlling how [`upgrade_firmware`] drives the upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeParams {
    /// Image slot number to upload into (see [`ImageUpload::image`]).
    pub target_image: u32,
    /// If true, reject the upload when the image is not newer than what is
    /// already on the device.
    pub upgrade_only: bool,
    /// If true, skip the reset/reconnect/confirm phases after upload and
    /// leave the image merely marked for test boot.
    pub skip_reboot: bool,
    /// Overall deadline for the post-reset reconnect phase.
    pub reconnect_deadline: Duration,
}

impl Default for UpgradeParams {
    fn default() -> Self {
        Self {
            target_image: 0,
            upgrade_only: false,
            skip_reboot: false,
            reconnect_deadline: DEFAULT_RECONNECT_DEADLINE,
        }
    }
}

/// Errors that can terminate an upgrade.
#[derive(Error, Debug, Diagnostic)]
pub enum UpgradeError {
    /// An `image/upload` request failed and could not be recovered by
    /// halving the chunk size or resuming from the device's offset.
    #[error("uploading the image failed")]
    #[diagnostic(code(smp_client::upgrade::upload_failed))]
    UpgradeUploadFailed(#[source] ExecuteError),
    /// Marking the image for test boot, or the subsequent `os/reset`,
    /// failed with something other than a timeout.
    #[error("resetting the device after upload failed")]
    #[diagnostic(code(smp_client::upgrade::reset_failed))]
    UpgradeResetFailed(#[source] ExecuteError),
    /// The device did not come back within the reconnect deadline, or
    /// confirming the new image failed.
    #[error("confirming the new image failed")]
    #[diagnostic(code(smp_client::upgrade::confirm_failed))]
    UpgradeConfirmFailed(#[source] ExecuteError),
    /// After reconnecting, the active image's hash did not match the
    /// image that was uploaded.
    #[error("active image hash does not match the uploaded image")]
    #[diagnostic(code(smp_client::upgrade::hash_mismatch))]
    UpgradeHashMismatch,
    /// The candidate image's MCUboot header could not be parsed.
    #[error("could not parse image header")]
    #[diagnostic(code(smp_client::upgrade::bad_image))]
    BadImage(#[from] ImageParseError),
    /// [`firmware_update`] found the image already active and running,
    /// confirmed, on the device.
    #[error("this image is already active on the device")]
    #[diagnostic(code(smp_client::upgrade::already_active))]
    AlreadyActive,
}

fn is_too_large_error(err: &ExecuteError) -> bool {
    matches!(
        err,
        ExecuteError::DeviceError(DeviceError::V1 { rc })
            if *rc == MCUmgrErr::MGMT_ERR_EMSGSIZE as i32
    )
}

/// Runs the firmware upgrade state machine against `client`, returning a
/// stream of progress updates terminated by either a final `Done` update or
/// an error.
pub fn upgrade_firmware(
    client: SmpClient,
    image: Vec<u8>,
    params: UpgradeParams,
) -> ReceiverStream<Result<UpgradeProgress, UpgradeError>> {
    let (tx, rx) = mpsc::channel(PROGRESS_QUEUE_DEPTH);
    tokio::spawn(run_upgrade(client, image, params, tx));
    ReceiverStream::new(rx)
}

async fn run_upgrade(
    client: SmpClient,
    image: Vec<u8>,
    params: UpgradeParams,
    progress: mpsc::Sender<Result<UpgradeProgress, UpgradeError>>,
) {
    if let Err(err) = drive_upgrade(&client, &image, &params, &progress).await {
        let _ = progress.send(Err(err)).await;
    }
}

async fn drive_upgrade(
    client: &SmpClient,
    image: &[u8],
    params: &UpgradeParams,
    progress: &mpsc::Sender<Result<UpgradeProgress, UpgradeError>>,
) -> Result<(), UpgradeError> {
    let total = image.len() as u64;
    let sha: [u8; 32] = Sha256::digest(image).into();

    send_progress(
        progress,
        UpgradePhase::ProbingMtu,
        0,
        total,
    )
    .await;
    // Establishes that the device is reachable before committing to an
    // upload; also warms the chunk-size calculation against the
    // connection's current max_unencoded_size.
    client
        .image_state()
        .await
        .map_err(UpgradeError::UpgradeUploadFailed)?;

    let uploaded = upload_image(client, image, &sha, total, params, progress).await?;
    debug_assert_eq!(uploaded, total);

    if params.skip_reboot {
        send_progress(progress, UpgradePhase::Done, total, total).await;
        return Ok(());
    }

    send_progress(progress, UpgradePhase::WaitingSwap, total, total).await;
    client
        .image_set_state(Some(&sha), false)
        .await
        .map_err(UpgradeError::UpgradeResetFailed)?;
    client.os_reset(false).await.map_err(UpgradeError::UpgradeResetFailed)?;

    send_progress(progress, UpgradePhase::Reconnecting, total, total).await;
    let state = reconnect_and_read_state(client, params.reconnect_deadline).await?;

    send_progress(progress, UpgradePhase::Confirming, total, total).await;
    let active = state
        .images
        .iter()
        .find(|img| img.active)
        .ok_or(UpgradeError::UpgradeHashMismatch)?;
    if active.hash != Some(sha) {
        return Err(UpgradeError::UpgradeHashMismatch);
    }

    if !active.confirmed {
        client
            .image_set_state(Some(&sha), true)
            .await
            .map_err(UpgradeError::UpgradeConfirmFailed)?;
    }

    send_progress(progress, UpgradePhase::Done, total, total).await;
    Ok(())
}

async fn upload_image(
    client: &SmpClient,
    image: &[u8],
    sha: &[u8; 32],
    total: u64,
    params: &UpgradeParams,
    progress: &mpsc::Sender<Result<UpgradeProgress, UpgradeError>>,
) -> Result<u64, UpgradeError> {
    let connection = client.connection();
    let mut chunk_size = image::image_upload_max_data_chunk_size(connection.max_unencoded_size())
        .map_err(|_| UpgradeError::UpgradeUploadFailed(ExecuteError::EncodeFailed))?;

    let mut off = 0u64;
    send_progress(progress, UpgradePhase::Uploading, off, total).await;

    while off < total {
        let end = (off + chunk_size as u64).min(total) as usize;
        let request = if off == 0 {
            ImageUpload {
                image: Some(params.target_image),
                len: Some(total),
                off: 0,
                sha: Some(sha),
                data: &image[0..end],
                upgrade: Some(params.upgrade_only),
            }
        } else {
            ImageUpload {
                image: None,
                len: None,
                off,
                sha: None,
                data: &image[off as usize..end],
                upgrade: None,
            }
        };

        match connection.request(&request).await {
            Ok(ImageUploadResponse { off: acked, .. }) => {
                off = acked;
                send_progress(progress, UpgradePhase::Uploading, off, total).await;
            }
            Err(err) if is_too_large_error(&err) => {
                chunk_size = (chunk_size / 2).max(1);
            }
            Err(err) => return Err(UpgradeError::UpgradeUploadFailed(err)),
        }
    }

    Ok(off)
}

async fn reconnect_and_read_state(
    client: &SmpClient,
    deadline: Duration,
) -> Result<crate::commands::image::GetImageStateResponse, UpgradeError> {
    let start = tokio::time::Instant::now();
    let mut backoff = RECONNECT_INITIAL_BACKOFF;

    loop {
        match client.image_state().await {
            Ok(state) => return Ok(state),
            Err(_) if start.elapsed() < deadline => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF);
            }
            Err(err) => return Err(UpgradeError::UpgradeConfirmFailed(err)),
        }
    }
}

async fn send_progress(
    progress: &mpsc::Sender<Result<UpgradeProgress, UpgradeError>>,
    phase: UpgradePhase,
    bytes_uploaded: u64,
    total_bytes: u64,
) {
    let _ = progress
        .send(Ok(UpgradeProgress {
            phase,
            bytes_uploaded,
            total_bytes,
        }))
        .await;
}

/// Updates a device's firmware, short-circuiting if `image` is already the
/// active, confirmed image.
///
/// This is the entry point most callers want: it parses `image`'s MCUboot
/// header to learn its hash, compares that against the device's currently
/// active image, and only runs [`upgrade_firmware`] if they differ.
pub fn firmware_update(
    client: SmpClient,
    image: Vec<u8>,
    params: UpgradeParams,
) -> ReceiverStream<Result<UpgradeProgress, UpgradeError>> {
    let (tx, rx) = mpsc::channel(PROGRESS_QUEUE_DEPTH);
    tokio::spawn(async move {
        if let Err(err) = run_firmware_update(&client, &image, &params, &tx).await {
            let _ = tx.send(Err(err)).await;
        }
    });
    ReceiverStream::new(rx)
}

async fn run_firmware_update(
    client: &SmpClient,
    image: &[u8],
    params: &UpgradeParams,
    progress: &mpsc::Sender<Result<UpgradeProgress, UpgradeError>>,
) -> Result<(), UpgradeError> {
    let info = mcuboot::get_image_info(image)?;

    let state = client
        .image_state()
        .await
        .map_err(UpgradeError::UpgradeUploadFailed)?;
    let already_active = state
        .images
        .iter()
        .any(|img| img.active && img.confirmed && img.hash == Some(info.hash));
    if already_active {
        return Err(UpgradeError::AlreadyActive);
    }

    let mut inner = upgrade_firmware(client.clone(), image.to_vec(), params.clone());
    use tokio_stream::StreamExt;
    while let Some(update) = inner.next().await {
        let done = matches!(
            update,
            Ok(UpgradeProgress {
                phase: UpgradePhase::Done,
                ..
            })
        );
        if progress.send(update).await.is_err() {
            // Receiver dropped; nothing left to report to.
            break;
        }
        if done {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_documented_defaults() {
        let params = UpgradeParams::default();
        assert_eq!(params.target_image, 0);
        assert!(!params.upgrade_only);
        assert!(!params.skip_reboot);
        assert_eq!(params.reconnect_deadline, Duration::from_secs(60));
    }

    #[test]
    fn recognizes_too_large_device_error() {
        let err = ExecuteError::DeviceError(DeviceError::V1 {
            rc: MCUmgrErr::MGMT_ERR_EMSGSIZE as i32,
        });
        assert!(is_too_large_error(&err));

        let other = ExecuteError::DeviceError(DeviceError::V1 {
            rc: MCUmgrErr::MGMT_ERR_ENOENT as i32,
        });
        assert!(!is_too_large_error(&other));
    }
}
