use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl};

use crate::{config::OAuthConfig, AppResult};

type HappyClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Clone)]
pub struct Clients {
    pub(crate) userinfo_url: Option<String>,
    client: Option<HappyClient>,
}

impl Clients {
    pub fn from_config(config: Option<&OAuthConfig>) -> AppResult<Clients> {
        let Some(config) = config else {
            return Ok(Clients { userinfo_url: None, client: None });
        };

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone())?)
            .set_token_uri(TokenUrl::new(config.token_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        Ok(
            Clients {
                userinfo_url: Some(config.userinfo_url.clone()),
                client: Some(client),
            }
        )
    }

    pub fn get_client(&self) -> AppResult<(HappyClient, String)> {
        match (&self.client, &self.userinfo_url) {
            (Some(client), Some(userinfo_url)) => Ok((client.clone(), userinfo_url.clone())),
            _ => Err("OAuth provider keys not supplied".into()),
        }
    }
}
