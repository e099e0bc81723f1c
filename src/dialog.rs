use anyhow::Result;

/// Shows a native multi-select picker for executables. An empty list means
/// the user cancelled.
pub fn pick_executables() -> Result<Vec<String>> {
    #[cfg(windows)]
    {
        win::pick_executables()
    }
    #[cfg(not(windows))]
    {
        anyhow::bail!("file dialog is not supported on this platform; type a path instead")
    }
}

#[cfg(windows)]
mod win {
    use anyhow::{Context, Result};
    use windows::{
        core::{w, HRESULT},
        Win32::{
            Foundation::{ERROR_CANCELLED, HWND},
            System::Com::{CoCreateInstance, CLSCTX_INPROC_SERVER},
            UI::Shell::{
                Common::COMDLG_FILTERSPEC, FileOpenDialog, IFileOpenDialog, FOS_ALLOWMULTISELECT,
                FOS_FILEMUSTEXIST, SIGDN_FILESYSPATH,
            },
        },
    };

    use crate::windows_utils::{CoTaskMemGuard, ComGuard};

    pub(super) fn pick_executables() -> Result<Vec<String>> {
        let _com = ComGuard::new().context("failed to initialise COM")?;
        unsafe {
            let dialog: IFileOpenDialog = CoCreateInstance(&FileOpenDialog, None, CLSCTX_INPROC_SERVER)
                .context("failed to create file dialog")?;
            let options = dialog.GetOptions()?;
            dialog.SetOptions(options | FOS_ALLOWMULTISELECT | FOS_FILEMUSTEXIST)?;
            dialog.SetFileTypes(&[
                COMDLG_FILTERSPEC {
                    pszName: w!("Executables"),
                    pszSpec: w!("*.exe"),
                },
                COMDLG_FILTERSPEC {
                    pszName: w!("All files"),
                    pszSpec: w!("*.*"),
                },
            ])?;

            if let Err(err) = dialog.Show(HWND::default()) {
                if err.code() == HRESULT::from_win32(ERROR_CANCELLED.0) {
                    return Ok(Vec::new());
                }
                return Err(err).context("file dialog failed");
            }

            let items = dialog.GetResults()?;
            let count = items.GetCount()?;
            let mut paths = Vec::with_capacity(count as usize);
            for index in 0..count {
                let item = items.GetItemAt(index)?;
                let name = CoTaskMemGuard(item.GetDisplayName(SIGDN_FILESYSPATH)?);
                paths.push(name.0.to_string().context("path is not valid utf-16")?);
            }
            Ok(paths)
        }
    }
}
