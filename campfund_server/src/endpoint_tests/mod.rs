mod donations;
mod helpers;
mod mocks;
mod webhooks;
