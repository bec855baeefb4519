//! A high-level client exposing one method per SMP management command.

use miette::Diagnostic;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::commands::config::{ReadSetting, SaveSettings, WriteSetting};
use crate::commands::fs::{
    self, FileChecksum, FileChecksumResponse, FileClose, FileDownload, FileStatus, FileUpload,
    SupportedFileChecksumTypesResponse,
};
use crate::commands::image::{
    self, GetImageState, GetImageStateResponse, ImageErase, ImageUpload, ImageUploadResponse,
    SetImageState, SlotInfo, SlotInfoResponse,
};
use crate::commands::os::{
    ApplicationInfo, BootloaderInfo, BootloaderInfoMcubootMode, BootloaderInfoMcubootModeResponse,
    DateTimeGet, DateTimeSet, Echo, MCUmgrParameters, MCUmgrParametersResponse, SystemReset,
    TaskStatistics, TaskStatisticsResponse,
};
use crate::commands::shell::ShellCommandLineExecute;
use crate::commands::stat::{StatGroupData, StatGroupDataResponse, StatGroupList};
use crate::commands::zephyr::EraseStorage;
use crate::connection::{Connection, ExecuteError};
use crate::transport::Transport;

/// A high-level SMP client exposing one method per management command,
/// built on top of a [`Connection`].
///
/// Cloning a `SmpClient` is cheap and shares the same underlying connection.
#[derive(Clone)]
pub struct SmpClient {
    connection: Connection,
}

/// Errors that can happen while downloading a file with [`SmpClient::fs_file_download`].
#[derive(Error, Debug, Diagnostic)]
pub enum FileDownloadError {
    /// An error happened executing one of the download's SMP requests.
    #[error("command execution failed")]
    #[diagnostic(code(smp_client::client::file_download::execute))]
    Execute(#[from] ExecuteError),
    /// The device replied with an offset other than the one requested.
    #[error("response offset {got} does not match the requested offset {expected}")]
    #[diagnostic(code(smp_client::client::file_download::offset_mismatch))]
    UnexpectedOffset {
        /// offset that was requested
        expected: u64,
        /// offset the device actually replied with
        got: u64,
    },
    /// The device's first response omitted the file length.
    #[error("device did not report a file length in its first response")]
    #[diagnostic(code(smp_client::client::file_download::missing_size))]
    MissingSize,
}

/// Errors that can happen while uploading a file or image in chunks.
#[derive(Error, Debug, Diagnostic)]
pub enum UploadError {
    /// An error happened executing one of the upload's SMP requests.
    #[error("command execution failed")]
    #[diagnostic(code(smp_client::client::upload::execute))]
    Execute(#[from] ExecuteError),
    /// The connection's transport cannot carry a single payload byte.
    #[error("could not size an upload chunk to fit inside one SMP frame")]
    #[diagnostic(code(smp_client::client::upload::chunk_size))]
    ChunkSize(#[from] std::io::Error),
}

impl SmpClient {
    /// Wraps an already-constructed [`Connection`].
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Takes ownership of `transport` and builds a client directly on top of it.
    pub fn from_transport<T: Transport + Send + 'static>(transport: T) -> Self {
        Self::new(Connection::new(transport))
    }

    /// The underlying protocol connection, for callers that need
    /// [`Connection::request`] directly or a non-default timeout.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    // --- os group ---------------------------------------------------

    /// Sends `message` to the device and returns what it echoed back.
    pub async fn os_echo(&self, message: &str) -> Result<String, ExecuteError> {
        self.connection
            .request(&Echo { d: message })
            .await
            .map(|r| r.r)
    }

    /// Reads per-task/thread CPU and stack statistics.
    pub async fn os_task_statistics(&self) -> Result<TaskStatisticsResponse, ExecuteError> {
        self.connection.request(&TaskStatistics).await
    }

    /// Reads the device's current date and time.
    pub async fn os_datetime_get(&self) -> Result<chrono::NaiveDateTime, ExecuteError> {
        self.connection
            .request(&DateTimeGet)
            .await
            .map(|r| r.datetime)
    }

    /// Sets the device's date and time.
    pub async fn os_datetime_set(&self, datetime: chrono::NaiveDateTime) -> Result<(), ExecuteError> {
        self.connection.request(&DateTimeSet { datetime }).await?;
        Ok(())
    }

    /// Resets the device. The device may disconnect before sending a
    /// response, so a timeout here is treated as success.
    pub async fn os_reset(&self, force: bool) -> Result<(), ExecuteError> {
        match self
            .connection
            .request(&SystemReset {
                force,
                boot_mode: None,
            })
            .await
        {
            Ok(_) | Err(ExecuteError::Timeout) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Reads the device's SMP buffer size and count.
    pub async fn os_mcumgr_parameters(&self) -> Result<MCUmgrParametersResponse, ExecuteError> {
        self.connection.request(&MCUmgrParameters).await
    }

    /// Reads free-form application/OS build information.
    pub async fn os_application_info(&self, format: Option<&str>) -> Result<String, ExecuteError> {
        self.connection
            .request(&ApplicationInfo { format })
            .await
            .map(|r| r.output)
    }

    /// Reads the name of the bootloader running on the device.
    pub async fn os_bootloader_info(&self) -> Result<String, ExecuteError> {
        self.connection
            .request(&BootloaderInfo)
            .await
            .map(|r| r.bootloader)
    }

    /// Reads MCUboot-specific bootloader state (swap mode, downgrade policy).
    pub async fn os_bootloader_info_mcuboot_mode(
        &self,
    ) -> Result<BootloaderInfoMcubootModeResponse, ExecuteError> {
        self.connection.request(&BootloaderInfoMcubootMode {}).await
    }

    // --- image group ------------------------------------------------

    /// Reads the state of every image slot.
    pub async fn image_state(&self) -> Result<GetImageStateResponse, ExecuteError> {
        self.connection.request(&GetImageState).await
    }

    /// Marks an image for test boot (`confirm: false`) or permanently
    /// confirms the currently running image (`confirm: true`, `hash: None`).
    pub async fn image_set_state(
        &self,
        hash: Option<&[u8; 32]>,
        confirm: bool,
    ) -> Result<GetImageStateResponse, ExecuteError> {
        self.connection.request(&SetImageState { hash, confirm }).await
    }

    /// Erases the given image slot, or slot 1 if `slot` is `None`.
    pub async fn image_erase(&self, slot: Option<u32>) -> Result<(), ExecuteError> {
        self.connection.request(&ImageErase { slot }).await?;
        Ok(())
    }

    /// Enumerates the device's image slots and their maximum sizes.
    pub async fn image_slot_info(&self) -> Result<SlotInfoResponse, ExecuteError> {
        self.connection.request(&SlotInfo).await
    }

    /// Uploads a complete firmware image in chunks sized to the connection's
    /// transport, reporting `(bytes_uploaded, total_bytes)` after each chunk.
    pub async fn image_upload(
        &self,
        image: &[u8],
        target_image: u32,
        upgrade_only: bool,
        mut on_progress: impl FnMut(u64, u64),
    ) -> Result<(), UploadError> {
        let sha: [u8; 32] = Sha256::digest(image).into();
        let chunk_size = image::image_upload_max_data_chunk_size(self.connection.max_unencoded_size())?;
        let total = image.len();

        let mut off = 0usize;
        while off < total {
            let end = (off + chunk_size).min(total);
            let request = if off == 0 {
                ImageUpload {
                    image: Some(target_image),
                    len: Some(total as u64),
                    off: 0,
                    sha: Some(&sha),
                    data: &image[off..end],
                    upgrade: Some(upgrade_only),
                }
            } else {
                ImageUpload {
                    image: None,
                    len: None,
                    off: off as u64,
                    sha: None,
                    data: &image[off..end],
                    upgrade: None,
                }
            };

            let response: ImageUploadResponse = self.connection.request(&request).await?;
            off = response.off as usize;
            on_progress(off as u64, total as u64);
        }

        Ok(())
    }

    // --- stat group -------------------------------------------------

    /// Lists the names of statistic groups registered on the device.
    pub async fn stat_group_list(&self) -> Result<Vec<String>, ExecuteError> {
        self.connection
            .request(&StatGroupList)
            .await
            .map(|r| r.stat_list)
    }

    /// Reads the counters of a single named statistic group.
    pub async fn stat_group_data(&self, name: &str) -> Result<StatGroupDataResponse, ExecuteError> {
        self.connection.request(&StatGroupData { name }).await
    }

    // --- config/settings group ---------------------------------------

    /// Reads the raw bytes stored under `name`.
    pub async fn config_read_setting(&self, name: &str) -> Result<Vec<u8>, ExecuteError> {
        self.connection
            .request(&ReadSetting {
                name,
                max_size: None,
            })
            .await
            .map(|r| r.val)
    }

    /// Writes `val` under `name` in the device's in-memory settings tree.
    pub async fn config_write_setting(&self, name: &str, val: &[u8]) -> Result<(), ExecuteError> {
        self.connection.request(&WriteSetting { name, val }).await?;
        Ok(())
    }

    /// Persists the in-memory settings tree to the backing store.
    pub async fn config_save_settings(&self) -> Result<(), ExecuteError> {
        self.connection.request(&SaveSettings).await?;
        Ok(())
    }

    // --- fs group ---------------------------------------------------

    /// Downloads an entire file from the device into memory, one chunk per
    /// SMP request.
    pub async fn fs_file_download(&self, name: &str) -> Result<Vec<u8>, FileDownloadError> {
        let first = self.connection.request(&FileDownload { name, off: 0 }).await?;
        let file_len = first.len.ok_or(FileDownloadError::MissingSize)?;

        let mut data = first.data;
        let mut offset = data.len() as u64;

        while offset < file_len {
            let response = self
                .connection
                .request(&FileDownload { name, off: offset })
                .await?;
            if response.off != offset {
                return Err(FileDownloadError::UnexpectedOffset {
                    expected: offset,
                    got: response.off,
                });
            }
            data.extend_from_slice(&response.data);
            offset += response.data.len() as u64;
        }

        Ok(data)
    }

    /// Uploads `data` as the file at `name`, one chunk per SMP request.
    pub async fn fs_file_upload(&self, name: &str, data: &[u8]) -> Result<(), UploadError> {
        let chunk_size =
            fs::file_upload_max_data_chunk_size(self.connection.max_unencoded_size(), name)?;
        let total = data.len();

        let mut off = 0usize;
        while off < total {
            let end = (off + chunk_size).min(total);
            let request = FileUpload {
                off: off as u64,
                data: &data[off..end],
                name,
                len: if off == 0 { Some(total as u64) } else { None },
            };
            let response = self.connection.request(&request).await?;
            off = response.off as usize;
        }

        Ok(())
    }

    /// Reads the size of a file on the device.
    pub async fn fs_file_status(&self, name: &str) -> Result<u64, ExecuteError> {
        self.connection
            .request(&FileStatus { name })
            .await
            .map(|r| r.len)
    }

    /// Computes a hash or checksum of a file on the device.
    pub async fn fs_file_checksum(
        &self,
        name: &str,
        algorithm: Option<&str>,
    ) -> Result<FileChecksumResponse, ExecuteError> {
        self.connection
            .request(&FileChecksum {
                name,
                r#type: algorithm,
                off: 0,
                len: None,
            })
            .await
    }

    /// Lists the hash/checksum algorithms the device supports.
    pub async fn fs_supported_file_checksum_types(
        &self,
    ) -> Result<SupportedFileChecksumTypesResponse, ExecuteError> {
        self.connection
            .request(&fs::SupportedFileChecksumTypes)
            .await
    }

    /// Closes any file left open by a previous download/upload on the device.
    pub async fn fs_file_close(&self) -> Result<(), ExecuteError> {
        self.connection.request(&FileClose).await?;
        Ok(())
    }

    // --- shell group --------------------------------------------------

    /// Executes a shell command line on the device and returns its captured
    /// output alongside its return code.
    pub async fn shell_execute(&self, argv: &[String]) -> Result<(String, i32), ExecuteError> {
        self.connection
            .request(&ShellCommandLineExecute { argv })
            .await
            .map(|r| (r.o, r.ret))
    }

    // --- zephyr basic group ---------------------------------------------

    /// Erases the device's settings/storage partition.
    pub async fn zephyr_erase_storage(&self) -> Result<(), ExecuteError> {
        self.connection.request(&EraseStorage).await?;
        Ok(())
    }
}
