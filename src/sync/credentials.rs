use dirs::home_dir;
use git2::{Config, Cred, CredentialType, Error};
use std::path::PathBuf;

const SSH_KEY_NAMES: &[&str] = &[
    "id_ed25519",
    "id_ed25519_sk",
    "id_ecdsa",
    "id_ecdsa_sk",
    "id_rsa",
    "id_dsa",
];

const DEFAULT_USERNAME: &str = "git";

/// Hands out credentials for a fetch, one kind after the other.
///
/// libgit2 keeps calling the credential callback until it gets an error,
/// so every kind is only tried once: ssh-agent, the default keys in `~/.ssh`
/// (without passphrase), the git credential helper, then the default credential.
pub struct FetchCredentials {
    config: Config,
    ssh_keys: Vec<PathBuf>,
    username_tried: bool,
    agent_tried: bool,
    next_ssh_key: usize,
    helper_tried: bool,
    default_tried: bool,
}

impl FetchCredentials {
    pub fn new(config: Config) -> Self {
        let ssh_directory = home_dir().unwrap_or(PathBuf::from("~")).join(".ssh");
        let ssh_keys = SSH_KEY_NAMES
            .iter()
            .map(|name| ssh_directory.join(name))
            .filter(|key| key.exists())
            .collect();

        Self::with_ssh_keys(config, ssh_keys)
    }

    fn with_ssh_keys(config: Config, ssh_keys: Vec<PathBuf>) -> Self {
        FetchCredentials {
            config,
            ssh_keys,
            username_tried: false,
            agent_tried: false,
            next_ssh_key: 0,
            helper_tried: false,
            default_tried: false,
        }
    }

    pub fn next(
        &mut self,
        url: &str,
        username: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, Error> {
        // libgit2 asks for a username first, if the url doesn't contain one.
        if allowed.contains(CredentialType::USERNAME) && !self.username_tried {
            self.username_tried = true;
            return Cred::username(DEFAULT_USERNAME);
        }

        if allowed.contains(CredentialType::SSH_KEY) {
            let username = username.unwrap_or(DEFAULT_USERNAME);
            if !self.agent_tried {
                self.agent_tried = true;
                return Cred::ssh_key_from_agent(username);
            }
            if let Some(key) = self.ssh_keys.get(self.next_ssh_key) {
                self.next_ssh_key += 1;
                return Cred::ssh_key(username, None, key, None);
            }
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && !self.helper_tried {
            self.helper_tried = true;
            return Cred::credential_helper(&self.config, url, username);
        }

        if allowed.contains(CredentialType::DEFAULT) && !self.default_tried {
            self.default_tried = true;
            return Cred::default();
        }

        Err(Error::from_str(&format!("no more credentials to try for {url}")))
    }
}
