use anyhow::anyhow;
use tracing::{error, instrument};
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, E_ACCESSDENIED, HANDLE, HWND},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId},
    },
};

use super::{ActiveWindowData, ProviderError, WindowInfoProvider};

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    if size == 0 {
        format!("error code {}", err.0)
    } else {
        String::from_utf16_lossy(&message_buffer[0..size as usize])
    }
}

#[instrument]
pub fn get_active() -> Result<Option<ActiveWindowData>, ProviderError> {
    let window = unsafe { GetForegroundWindow() };

    // Happens on the lock screen or while focus is being transferred.
    if window.is_invalid() {
        return Ok(None);
    }

    let mut text: [u16; 4096] = [0; 4096];
    let title = unsafe { get_window_title(window, &mut text) };

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Failed to get active window process {}", last_error_message()).into());
    }

    let process_handle =
        match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) } {
            Ok(handle) => handle,
            // Elevated processes can't be inspected from a regular user session.
            Err(e) if e.code() == E_ACCESSDENIED => {
                return Err(ProviderError::PermissionDenied(format!(
                    "can't open process {id}: {e}"
                )))
            }
            Err(e) => return Err(anyhow!("Failed to open process {id}: {e:?}").into()),
        };

    let process_name = unsafe { get_window_process_path(process_handle, &mut text) }
        .inspect_err(|e| error!("Failed to get window process path {e:?}"));

    unsafe { CloseHandle(process_handle) }
        .inspect_err(|e| error!("Failed to close handle {e:?}"))
        .map_err(|e| anyhow!(e))?;

    Ok(Some(ActiveWindowData {
        window_title: title.into(),
        process_name: process_name.unwrap_or_default().into(),
    }))
}

unsafe fn get_window_process_path(
    process_handle: HANDLE,
    text: &mut [u16],
) -> windows::core::Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len.max(0) as usize])
}

#[derive(Default)]
pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl WindowInfoProvider for WindowsWindowManager {
    fn sample(&mut self) -> Result<Option<ActiveWindowData>, ProviderError> {
        get_active().inspect_err(|e| error!("Failed to get active window {e:?}"))
    }
}
