use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};

#[cfg(not(windows))]
use std::fs;

#[cfg(not(windows))]
use log::debug;

/// Launch-at-login registration for this executable.
pub trait Autostart: Send + Sync + 'static {
    /// Any failure to read the registration counts as disabled.
    fn is_enabled(&self) -> bool;
    fn set_enabled(&self, enable: bool) -> Result<()>;
}

pub fn platform_autostart() -> Result<Arc<dyn Autostart>> {
    let exe = std::env::current_exe().context("failed to resolve current executable")?;
    #[cfg(windows)]
    {
        Ok(Arc::new(RegistryAutostart::new(exe)))
    }
    #[cfg(not(windows))]
    {
        let dir = dirs::config_dir()
            .context("no config directory on this system")?
            .join("autostart");
        Ok(Arc::new(XdgAutostart::new(dir, exe)))
    }
}

#[cfg(windows)]
pub struct RegistryAutostart {
    exe: PathBuf,
}

#[cfg(windows)]
impl RegistryAutostart {
    const RUN_KEY: &'static str = r"Software\Microsoft\Windows\CurrentVersion\Run";
    const VALUE_NAME: &'static str = "USB AutoStart";

    pub fn new(exe: PathBuf) -> Self {
        Self { exe }
    }
}

#[cfg(windows)]
impl Autostart for RegistryAutostart {
    fn is_enabled(&self) -> bool {
        use winreg::{enums::HKEY_CURRENT_USER, RegKey};

        RegKey::predef(HKEY_CURRENT_USER)
            .open_subkey(Self::RUN_KEY)
            .and_then(|key| key.get_value::<String, _>(Self::VALUE_NAME))
            .is_ok()
    }

    fn set_enabled(&self, enable: bool) -> Result<()> {
        use std::io::ErrorKind;
        use winreg::{enums::HKEY_CURRENT_USER, RegKey};

        let (key, _) = RegKey::predef(HKEY_CURRENT_USER)
            .create_subkey(Self::RUN_KEY)
            .context("failed to open the Run registry key")?;
        if enable {
            let command = format!("\"{}\"", self.exe.display());
            key.set_value(Self::VALUE_NAME, &command)
                .context("failed to write autostart registry value")?;
            return Ok(());
        }
        match key.delete_value(Self::VALUE_NAME) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("failed to remove autostart registry value"),
        }
    }
}

/// Desktop entry under the XDG autostart directory.
#[cfg_attr(windows, allow(dead_code))]
pub struct XdgAutostart {
    dir: PathBuf,
    exe: PathBuf,
}

#[cfg_attr(windows, allow(dead_code))]
impl XdgAutostart {
    const FILE_NAME: &'static str = "usb-autostart.desktop";

    pub fn new(dir: PathBuf, exe: PathBuf) -> Self {
        Self { dir, exe }
    }

    fn entry_path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    fn entry_contents(&self) -> String {
        format!(
            "[Desktop Entry]\nType=Application\nName=USB AutoStart\nExec=\"{}\"\nX-GNOME-Autostart-enabled=true\n",
            self.exe.display()
        )
    }
}

#[cfg(not(windows))]
impl Autostart for XdgAutostart {
    fn is_enabled(&self) -> bool {
        fs::read_to_string(self.entry_path())
            .map(|content| !content.lines().any(|line| line.trim() == "Hidden=true"))
            .unwrap_or(false)
    }

    fn set_enabled(&self, enable: bool) -> Result<()> {
        let path = self.entry_path();
        if enable {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("failed to create {:?}", self.dir))?;
            fs::write(&path, self.entry_contents())
                .with_context(|| format!("failed to write {:?}", path))?;
            debug!("wrote autostart entry {:?}", path);
            return Ok(());
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {:?}", path)),
        }
    }
}
